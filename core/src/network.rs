//! Block requests sent to peers, and validation of their responses.

use async_trait::async_trait;
use mockall::automock;
use sp_core::H256;
use thiserror::Error;
use tracing::trace;

use crate::{
	sync::{Direction, FailureKind, RequestedData},
	types::{BlockData, BlockNumber, PeerId},
};

/// Block the requested range starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromBlock {
	Hash(H256),
	Number(BlockNumber),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
	pub from: FromBlock,
	pub direction: Direction,
	/// Maximum number of blocks in the response.
	pub max: u32,
	pub requested_data: RequestedData,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
	#[error("Request timed out")]
	Timeout,
	#[error("Request failed: {0}")]
	Failed(String),
}

impl From<&RequestError> for FailureKind {
	fn from(error: &RequestError) -> Self {
		match error {
			RequestError::Timeout => FailureKind::Timeout,
			RequestError::Failed(_) => FailureKind::RequestFailed,
		}
	}
}

#[async_trait]
#[automock]
pub trait Client {
	/// Requests a range of blocks from the given peer.
	async fn request_blocks(
		&self,
		peer_id: PeerId,
		request: BlockRequest,
	) -> Result<Vec<BlockData>, RequestError>;
}

/// Checks that the response is a chain matching the request.
///
/// Blocks are expected in the requested direction, starting at the requested block.
pub fn validate_response(request: &BlockRequest, blocks: &[BlockData]) -> Result<(), FailureKind> {
	let Some(first) = blocks.first() else {
		return Err(FailureKind::EmptyResponse);
	};

	if blocks.len() > request.max as usize {
		trace!(len = blocks.len(), max = request.max, "Response is too long");
		return Err(FailureKind::ResponseNotChain);
	}

	for block in blocks {
		if (request.requested_data.contains(RequestedData::HEADER) && block.header.is_none())
			|| (request.requested_data.contains(RequestedData::BODY) && block.body.is_none())
		{
			return Err(FailureKind::MissingBlockData);
		}
		if let Some(header) = &block.header {
			if header.hash() != block.hash {
				return Err(FailureKind::HashMismatch);
			}
		}
	}

	match request.from {
		FromBlock::Hash(hash) if first.hash != hash => return Err(FailureKind::HashMismatch),
		FromBlock::Number(number) if first.number().is_some_and(|first| first != number) => {
			return Err(FailureKind::ResponseNotChain)
		},
		_ => {},
	}

	for pair in blocks.windows(2) {
		let (parent, child) = match request.direction {
			Direction::Ascending => (&pair[0], &pair[1]),
			Direction::Descending => (&pair[1], &pair[0]),
		};
		let Some(child_header) = &child.header else {
			// nothing to link without headers
			continue;
		};
		if child_header.parent_hash != parent.hash {
			return Err(FailureKind::ResponseNotChain);
		}
	}

	Ok(())
}
