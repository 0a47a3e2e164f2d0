use std::collections::{HashSet, VecDeque};

use sp_core::H256;

use super::pending::PendingBlock;
use crate::types::{BlockData, BlockNumber, Body, Header, Justification};

/// Block whose header and body are known, and whose parent is stored or queued before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyBlock {
	hash: H256,
	header: Header,
	body: Body,
	justification: Option<Justification>,
}

impl ReadyBlock {
	pub fn hash(&self) -> H256 {
		self.hash
	}

	pub fn number(&self) -> BlockNumber {
		self.header.number
	}

	pub fn parent_hash(&self) -> H256 {
		self.header.parent_hash
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn body(&self) -> &Body {
		&self.body
	}

	pub fn justification(&self) -> Option<&Justification> {
		self.justification.as_ref()
	}

	pub fn into_parts(self) -> (Header, Body, Option<Justification>) {
		(self.header, self.body, self.justification)
	}
}

/// Gives the block data back if header or body is missing.
impl TryFrom<BlockData> for ReadyBlock {
	type Error = BlockData;

	fn try_from(block: BlockData) -> Result<Self, Self::Error> {
		match block {
			BlockData {
				hash,
				header: Some(header),
				body: Some(body),
				justification,
			} => Ok(ReadyBlock {
				hash,
				header,
				body,
				justification,
			}),
			incomplete => Err(incomplete),
		}
	}
}

impl TryFrom<PendingBlock> for ReadyBlock {
	type Error = PendingBlock;

	fn try_from(block: PendingBlock) -> Result<Self, Self::Error> {
		if !block.is_complete() {
			return Err(block);
		}
		ReadyBlock::try_from(BlockData::from(block)).map_err(PendingBlock::from)
	}
}

/// Resolved blocks awaiting application, in the order they were pushed.
#[derive(Debug, Default)]
pub struct ReadyBlockQueue {
	queue: VecDeque<ReadyBlock>,
	hashes: HashSet<H256>,
}

impl ReadyBlockQueue {
	pub fn push(&mut self, block: ReadyBlock) {
		self.hashes.insert(block.hash);
		self.queue.push_back(block);
	}

	pub fn pop(&mut self) -> Option<ReadyBlock> {
		let block = self.queue.pop_front()?;
		self.hashes.remove(&block.hash);
		Some(block)
	}

	pub fn contains(&self, hash: &H256) -> bool {
		self.hashes.contains(hash)
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	pub fn drain(&mut self) -> impl Iterator<Item = ReadyBlock> + '_ {
		std::iter::from_fn(move || self.pop())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn block(number: BlockNumber, parent_hash: H256) -> BlockData {
		let header = Header {
			parent_hash,
			number,
			state_root: H256::zero(),
			extrinsics_root: H256::zero(),
			digest: vec![],
		};
		BlockData {
			hash: header.hash(),
			header: Some(header),
			body: Some(Body::default()),
			justification: None,
		}
	}

	#[test]
	fn incomplete_blocks_are_rejected() {
		let mut data = block(1, H256::zero());
		data.body = None;
		let returned = ReadyBlock::try_from(data.clone()).unwrap_err();
		assert_eq!(returned, data);

		let pending = PendingBlock::new(H256::repeat_byte(1), 1);
		assert_eq!(ReadyBlock::try_from(pending.clone()).unwrap_err(), pending);
	}

	#[test]
	fn queue_is_fifo_with_membership() {
		let first = ReadyBlock::try_from(block(1, H256::zero())).unwrap();
		let second = ReadyBlock::try_from(block(2, first.hash())).unwrap();
		let mut queue = ReadyBlockQueue::default();

		queue.push(first.clone());
		queue.push(second.clone());
		assert!(queue.contains(&first.hash()));
		assert_eq!(queue.len(), 2);

		assert_eq!(queue.pop(), Some(first.clone()));
		assert!(!queue.contains(&first.hash()));
		assert_eq!(queue.drain().collect::<Vec<_>>(), vec![second]);
		assert!(queue.is_empty());
	}
}
