//! Finality oracle consumed by the sync core.
//!
//! The sync core never votes on or verifies finality, it only reads the highest finalized
//! header and asks whether a header is already stored.

use mockall::automock;
use sp_core::H256;
use thiserror::Error;

use crate::types::{BlockNumber, Header};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockStateError {
	#[error("Finalized header is not stored")]
	MissingFinalizedHeader,
	#[error("Parent {parent_hash:?} of block {hash:?} is not stored")]
	UnknownParent { hash: H256, parent_hash: H256 },
	#[error("Cannot finalize unknown block {0:?}")]
	UnknownBlock(H256),
	#[error("Finality cannot move backwards from {finalized} to {requested}")]
	FinalityReverted {
		finalized: BlockNumber,
		requested: BlockNumber,
	},
	#[error("Block {0:?} does not descend from the finalized block")]
	NotDescendant(H256),
	#[error("Storage failure: {0}")]
	Storage(String),
}

#[automock]
pub trait BlockState {
	/// Returns the highest finalized header.
	fn highest_finalized_header(&self) -> Result<Header, BlockStateError>;

	/// Checks whether header with given hash is stored.
	fn has_header(&self, hash: H256) -> Result<bool, BlockStateError>;
}
