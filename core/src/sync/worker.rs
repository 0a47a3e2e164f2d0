use bitflags::bitflags;
use sp_core::H256;
use strum::Display;

use super::SyncError;
use crate::{
	network::{BlockRequest, FromBlock},
	types::BlockNumber,
};

bitflags! {
	/// Bits of block data requested from peers.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct RequestedData: u8 {
		/// Include block header.
		const HEADER = 0b00000001;
		/// Include block body.
		const BODY = 0b00000010;
		/// Include block receipt.
		const RECEIPT = 0b00000100;
		/// Include block message queue.
		const MESSAGE_QUEUE = 0b00001000;
		/// Include a justification for the block.
		const JUSTIFICATION = 0b00010000;
		/// Everything needed to import a block.
		const BOOTSTRAP = Self::HEADER.bits() | Self::BODY.bits() | Self::JUSTIFICATION.bits();
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Direction {
	Ascending,
	Descending,
}

/// Reasons a worker can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FailureKind {
	/// Fetched block's parent is not known locally.
	UnknownParent,
	NoPeers,
	EmptyResponse,
	ResponseNotChain,
	MissingBlockData,
	HashMismatch,
	RequestFailed,
	Timeout,
	/// Fetched blocks could not be checked against the local chain.
	BlockStateUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
	Pending,
	Success,
	Failure(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub struct WorkerId(pub u64);

/// Hands out worker ids, never reusing one.
#[derive(Debug, Default)]
pub struct WorkerIdGenerator(u64);

impl WorkerIdGenerator {
	pub fn next_id(&mut self) -> WorkerId {
		self.0 += 1;
		WorkerId(self.0)
	}
}

/// Range fetch request scheduled against the peer network.
///
/// Zero hash means the hash at that height is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
	pub id: WorkerId,
	pub start_hash: H256,
	pub start_number: Option<BlockNumber>,
	pub target_hash: H256,
	pub target_number: Option<BlockNumber>,
	pub direction: Direction,
	pub requested_data: RequestedData,
	pub outcome: WorkerOutcome,
}

impl Worker {
	pub fn new(
		id: WorkerId,
		(start_hash, start_number): (H256, BlockNumber),
		(target_hash, target_number): (H256, BlockNumber),
		direction: Direction,
		requested_data: RequestedData,
	) -> Self {
		Worker {
			id,
			start_hash,
			start_number: Some(start_number),
			target_hash,
			target_number: Some(target_number),
			direction,
			requested_data,
			outcome: WorkerOutcome::Pending,
		}
	}

	pub fn bounds(&self) -> Result<(BlockNumber, BlockNumber), SyncError> {
		let start = self
			.start_number
			.ok_or(SyncError::NilWorkerStartNumber(self.id))?;
		let target = self
			.target_number
			.ok_or(SyncError::NilWorkerTargetNumber(self.id))?;
		Ok((start, target))
	}

	/// Checks if this worker's range is covered by an existing one on the same fork.
	///
	/// Workers without bounds are always covered.
	pub fn is_covered_by(&self, existing: &Worker) -> bool {
		let (Some(start), Some(target)) = (self.start_number, self.target_number) else {
			return true;
		};

		if self.direction != existing.direction || self.requested_data != existing.requested_data {
			return false;
		}

		let (Some(existing_start), Some(existing_target)) =
			(existing.start_number, existing.target_number)
		else {
			return false;
		};

		let contained = match self.direction {
			Direction::Ascending => target <= existing_target && start >= existing_start,
			Direction::Descending => target >= existing_target && start <= existing_start,
		};

		// either endpoint matching is taken as evidence of the same fork
		contained
			&& (self.start_hash == existing.start_hash || self.target_hash == existing.target_hash)
	}

	/// Splits the worker's range into requests of at most `max_response_size` blocks.
	///
	/// The first request starts from the start hash when known, subsequent ones from numbers.
	pub fn to_requests(&self, max_response_size: u32) -> Result<Vec<BlockRequest>, SyncError> {
		let (start, target) = self.bounds()?;
		let max_response_size = max_response_size.max(1);
		let total = start.abs_diff(target) + 1;

		let mut requests = vec![];
		let mut offset = 0;
		while offset < total {
			let max = (total - offset).min(max_response_size);
			let number = match self.direction {
				Direction::Ascending => start.saturating_add(offset),
				Direction::Descending => start.saturating_sub(offset),
			};
			let from = if offset == 0 && !self.start_hash.is_zero() {
				FromBlock::Hash(self.start_hash)
			} else {
				FromBlock::Number(number)
			};

			requests.push(BlockRequest {
				from,
				direction: self.direction,
				max,
				requested_data: self.requested_data,
			});
			offset += max;
		}

		Ok(requests)
	}
}
