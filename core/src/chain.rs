//! Local chain storage: imported blocks, canonical hashes and finality.

use sp_core::H256;
use tracing::{debug, info};

use crate::{
	data::{
		BestHeaderKey, BlockBodyKey, BlockHashKey, BlockHeaderKey, Database, FinalizedHeaderKey,
		JustificationKey,
	},
	finality::{BlockState, BlockStateError},
	sync::ReadyBlock,
	types::{BlockNumber, Body, Header},
};

/// Applies resolved blocks to the local chain.
pub trait BlockImport {
	/// Stores the block. Parent must already be stored, importing a stored block is a no-op.
	fn import_block(&self, block: ReadyBlock) -> Result<(), BlockStateError>;
}

#[derive(Clone)]
pub struct ChainStore<D: Database> {
	db: D,
}

impl<D: Database> ChainStore<D> {
	/// Opens chain store, initializing it with the genesis block if empty.
	pub fn new(db: D, genesis: Header) -> Self {
		if db.get(FinalizedHeaderKey).is_none() {
			let hash = genesis.hash();
			info!(?hash, "Initializing chain store with genesis");
			db.put(BlockHeaderKey(hash), genesis.clone());
			db.put(BlockBodyKey(hash), Body::default());
			db.put(BlockHashKey(genesis.number), hash);
			db.put(BestHeaderKey, genesis.clone());
			db.put(FinalizedHeaderKey, genesis);
		}
		ChainStore { db }
	}

	pub fn header(&self, hash: H256) -> Option<Header> {
		self.db.get(BlockHeaderKey(hash))
	}

	pub fn body(&self, hash: H256) -> Option<Body> {
		self.db.get(BlockBodyKey(hash))
	}

	/// Finalized block hash at the given height.
	pub fn finalized_hash(&self, number: BlockNumber) -> Option<H256> {
		self.db.get(BlockHashKey(number))
	}

	/// Highest imported header, or finalized header if nothing was imported on top of it.
	pub fn best_header(&self) -> Result<Header, BlockStateError> {
		match self.db.get(BestHeaderKey) {
			Some(header) => Ok(header),
			None => self.highest_finalized_header(),
		}
	}

	/// Finalizes the stored block, marking its ancestors down to the previous finalized block
	/// as canonical.
	pub fn finalize(&self, hash: H256) -> Result<Header, BlockStateError> {
		let header = self
			.header(hash)
			.ok_or(BlockStateError::UnknownBlock(hash))?;
		let finalized = self.highest_finalized_header()?;

		if header.number < finalized.number {
			return Err(BlockStateError::FinalityReverted {
				finalized: finalized.number,
				requested: header.number,
			});
		}

		let mut route = vec![];
		let mut current = header.clone();
		while current.number > finalized.number {
			let parent_hash = current.parent_hash;
			route.push((current.number, current.hash()));
			current = self
				.header(parent_hash)
				.ok_or(BlockStateError::NotDescendant(hash))?;
		}
		if current.hash() != finalized.hash() {
			return Err(BlockStateError::NotDescendant(hash));
		}

		for (number, hash) in route {
			self.db.put(BlockHashKey(number), hash);
		}
		self.db.put(FinalizedHeaderKey, header.clone());
		debug!(?hash, number = header.number, "Block finalized");
		Ok(header)
	}
}

impl<D: Database> BlockState for ChainStore<D> {
	fn highest_finalized_header(&self) -> Result<Header, BlockStateError> {
		self.db
			.get(FinalizedHeaderKey)
			.ok_or(BlockStateError::MissingFinalizedHeader)
	}

	fn has_header(&self, hash: H256) -> Result<bool, BlockStateError> {
		Ok(self.header(hash).is_some())
	}
}

impl<D: Database> BlockImport for ChainStore<D> {
	fn import_block(&self, block: ReadyBlock) -> Result<(), BlockStateError> {
		let hash = block.hash();
		if self.has_header(hash)? {
			return Ok(());
		}

		let parent_hash = block.parent_hash();
		if !self.has_header(parent_hash)? {
			return Err(BlockStateError::UnknownParent { hash, parent_hash });
		}

		let (header, body, justification) = block.into_parts();
		let number = header.number;
		if let Some(justification) = justification {
			self.db.put(JustificationKey(hash), justification);
		}
		self.db.put(BlockBodyKey(hash), body);
		self.db.put(BlockHeaderKey(hash), header.clone());

		if number > self.best_header()?.number {
			self.db.put(BestHeaderKey, header);
		}
		debug!(?hash, number, "Block imported");
		Ok(())
	}
}
