use sp_core::H256;
use thiserror::Error;

use crate::{finality::BlockStateError, types::PeerId};

pub mod directory;
pub mod pending;
pub mod ready;
pub mod tip;
pub mod worker;

pub use directory::{WorkerDirectory, WorkerEntry};
pub use pending::{PendingBlock, PendingBlockSet};
pub use ready::{ReadyBlock, ReadyBlockQueue};
pub use tip::TipSyncer;
pub use worker::{
	Direction, FailureKind, RequestedData, Worker, WorkerId, WorkerIdGenerator, WorkerOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
	#[error("Peer {0} announced a state without block number")]
	NilPeerNumber(PeerId),
	#[error("Worker {0} has no start number")]
	NilWorkerStartNumber(WorkerId),
	#[error("Worker {0} has no target number")]
	NilWorkerTargetNumber(WorkerId),
	#[error("Pending block {0:?} has no number")]
	NilPendingBlockNumber(H256),
	#[error("Worker {0} is still in flight")]
	IncompleteWorker(WorkerId),
	#[error(transparent)]
	BlockState(#[from] BlockStateError),
}
