//! Collection of blocks known only partially and not yet attachable to the local chain.
//!
//! A pending block can be known by hash and number only, by header, or by header and body
//! with an ancestor that is still missing. Blocks are indexed by hash and linked to their
//! children through the parent hash of the children's headers, so that resolving one block
//! gives direct access to the part of the set that becomes resolvable with it.

use std::{
	collections::{BTreeSet, HashMap},
	time::{Duration, Instant},
};

use sp_core::H256;

use crate::types::{BlockData, BlockNumber, Body, Header, Justification};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
	pub hash: H256,
	pub number: Option<BlockNumber>,
	pub header: Option<Header>,
	pub body: Option<Body>,
	pub justification: Option<Justification>,
}

impl PendingBlock {
	pub fn new(hash: H256, number: BlockNumber) -> Self {
		PendingBlock {
			hash,
			number: Some(number),
			header: None,
			body: None,
			justification: None,
		}
	}

	/// Header and body are both known.
	pub fn is_complete(&self) -> bool {
		self.header.is_some() && self.body.is_some()
	}

	fn parent_hash(&self) -> Option<H256> {
		self.header.as_ref().map(|header| header.parent_hash)
	}
}

impl From<BlockData> for PendingBlock {
	fn from(block: BlockData) -> Self {
		PendingBlock {
			hash: block.hash,
			number: block.number(),
			header: block.header,
			body: block.body,
			justification: block.justification,
		}
	}
}

impl From<PendingBlock> for BlockData {
	fn from(block: PendingBlock) -> Self {
		BlockData {
			hash: block.hash,
			header: block.header,
			body: block.body,
			justification: block.justification,
		}
	}
}

#[derive(Debug)]
struct Entry {
	block: PendingBlock,
	clear_at: Instant,
}

#[derive(Debug)]
pub struct PendingBlockSet {
	blocks: HashMap<H256, Entry>,
	/// Parent hash to the hashes of pending blocks whose header points to it.
	children: HashMap<H256, BTreeSet<H256>>,
	ttl: Duration,
}

impl Default for PendingBlockSet {
	fn default() -> Self {
		Self::new(Duration::from_secs(600))
	}
}

impl PendingBlockSet {
	pub fn new(ttl: Duration) -> Self {
		PendingBlockSet {
			blocks: HashMap::new(),
			children: HashMap::new(),
			ttl,
		}
	}

	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.blocks.is_empty()
	}

	pub fn contains(&self, hash: &H256) -> bool {
		self.blocks.contains_key(hash)
	}

	pub fn get(&self, hash: &H256) -> Option<&PendingBlock> {
		self.blocks.get(hash).map(|entry| &entry.block)
	}

	/// Returns all pending blocks, ordered by number and hash.
	pub fn blocks(&self) -> Vec<&PendingBlock> {
		let mut blocks = self
			.blocks
			.values()
			.map(|entry| &entry.block)
			.collect::<Vec<_>>();
		blocks.sort_by_key(|block| (block.number, block.hash));
		blocks
	}

	/// Inserts the block, merging known data into an existing entry with the same hash.
	///
	/// Every insertion refreshes the expiry deadline of the entry.
	pub fn insert(&mut self, block: PendingBlock) {
		let clear_at = Instant::now() + self.ttl;
		let hash = block.hash;

		let parent_hash = match self.blocks.get_mut(&hash) {
			Some(entry) => {
				let existing = &mut entry.block;
				let had_header = existing.header.is_some();
				existing.number = existing.number.or(block.number);
				if existing.header.is_none() {
					existing.header = block.header;
				}
				if block.body.is_some() {
					existing.body = block.body;
				}
				if block.justification.is_some() {
					existing.justification = block.justification;
				}
				entry.clear_at = clear_at;
				// only a newly learned header adds an edge
				existing.parent_hash().filter(|_| !had_header)
			},
			None => {
				let parent_hash = block.parent_hash();
				self.blocks.insert(hash, Entry { block, clear_at });
				parent_hash
			},
		};

		if let Some(parent_hash) = parent_hash {
			self.children.entry(parent_hash).or_default().insert(hash);
		}
	}

	pub fn add_hash_and_number(&mut self, hash: H256, number: BlockNumber) {
		self.insert(PendingBlock::new(hash, number));
	}

	pub fn add_header(&mut self, header: Header) {
		let mut block = PendingBlock::new(header.hash(), header.number);
		block.header = Some(header);
		self.insert(block);
	}

	pub fn add_block(&mut self, block: BlockData) {
		self.insert(block.into());
	}

	pub fn remove(&mut self, hash: &H256) -> Option<PendingBlock> {
		let Entry { block, .. } = self.blocks.remove(hash)?;

		if let Some(parent_hash) = block.parent_hash() {
			if let Some(siblings) = self.children.get_mut(&parent_hash) {
				siblings.remove(hash);
				if siblings.is_empty() {
					self.children.remove(&parent_hash);
				}
			}
		}
		Some(block)
	}

	/// Hashes of the pending blocks whose header names the given block as parent.
	pub fn children(&self, hash: &H256) -> impl DoubleEndedIterator<Item = &H256> {
		self.children.get(hash).into_iter().flatten()
	}

	/// Returns descendants of the given block that are complete, in parent-before-child order.
	///
	/// The walk stops at incomplete blocks, their descendants are not returned.
	pub fn ready_descendants(&self, hash: &H256) -> Vec<H256> {
		let mut ready = vec![];
		let mut stack = self.children(hash).rev().copied().collect::<Vec<_>>();

		while let Some(child) = stack.pop() {
			let Some(block) = self.get(&child) else {
				continue;
			};
			if !block.is_complete() {
				continue;
			}
			ready.push(child);
			stack.extend(self.children(&child).rev().copied());
		}

		ready
	}

	/// Removes complete descendants of the given block, see [`Self::ready_descendants`].
	pub fn take_ready_descendants(&mut self, hash: &H256) -> Vec<PendingBlock> {
		self.ready_descendants(hash)
			.iter()
			.filter_map(|hash| self.remove(hash))
			.collect()
	}

	/// Removes blocks at or below the given number.
	pub fn remove_lower_blocks(&mut self, number: BlockNumber) -> Vec<H256> {
		let lower = self
			.blocks
			.values()
			.filter(|entry| entry.block.number.is_some_and(|n| n <= number))
			.map(|entry| entry.block.hash)
			.collect::<Vec<_>>();

		for hash in &lower {
			self.remove(hash);
		}
		lower
	}

	/// Removes blocks that have not been touched since their deadline.
	pub fn prune_expired(&mut self, now: Instant) -> Vec<H256> {
		let expired = self
			.blocks
			.values()
			.filter(|entry| entry.clear_at <= now)
			.map(|entry| entry.block.hash)
			.collect::<Vec<_>>();

		for hash in &expired {
			self.remove(hash);
		}
		expired
	}
}
