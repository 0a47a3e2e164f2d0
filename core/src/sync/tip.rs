//! Worker scheduling when syncing at the tip of the chain.
//!
//! # Flow
//!
//! * Peer announcements become single block workers, unless already below finality
//! * Failed workers are retried with their range clamped to the finality boundary
//! * Periodic ticks scan the pending set, drop finalized leftovers, request missing data and
//!   ancestors, and promote blocks whose parent became known into the ready queue
//!
//! # Notes
//!
//! Unknown parent failures are not retried from the worker result, the next tick has the whole
//! pending set at hand and requests the missing ancestors instead.

use std::collections::HashSet;

use sp_core::H256;
use tracing::{debug, trace, warn};

use super::{
	pending::PendingBlockSet,
	ready::{ReadyBlock, ReadyBlockQueue},
	worker::{
		Direction, FailureKind, RequestedData, Worker, WorkerIdGenerator, WorkerOutcome,
	},
	SyncError,
};
use crate::{finality::BlockState, types::PeerState};

pub struct TipSyncer<S: BlockState> {
	block_state: S,
	pending_blocks: PendingBlockSet,
	ready_blocks: ReadyBlockQueue,
	worker_ids: WorkerIdGenerator,
}

impl<S: BlockState> TipSyncer<S> {
	pub fn new(block_state: S, pending_blocks: PendingBlockSet) -> Self {
		TipSyncer {
			block_state,
			pending_blocks,
			ready_blocks: ReadyBlockQueue::default(),
			worker_ids: WorkerIdGenerator::default(),
		}
	}

	pub fn block_state(&self) -> &S {
		&self.block_state
	}

	pub fn pending_blocks(&self) -> &PendingBlockSet {
		&self.pending_blocks
	}

	pub fn pending_blocks_mut(&mut self) -> &mut PendingBlockSet {
		&mut self.pending_blocks
	}

	pub fn ready_blocks(&self) -> &ReadyBlockQueue {
		&self.ready_blocks
	}

	pub fn ready_blocks_mut(&mut self) -> &mut ReadyBlockQueue {
		&mut self.ready_blocks
	}

	/// Block is stored or waiting in the ready queue.
	pub fn is_known(&self, hash: H256) -> Result<bool, SyncError> {
		Ok(self.ready_blocks.contains(&hash) || self.block_state.has_header(hash)?)
	}

	pub fn handle_new_peer_state(
		&mut self,
		peer_state: &PeerState,
	) -> Result<Option<Worker>, SyncError> {
		let number = peer_state
			.number
			.ok_or_else(|| SyncError::NilPeerNumber(peer_state.peer_id.clone()))?;

		let finalized = self.block_state.highest_finalized_header()?;
		if number < finalized.number {
			trace!(
				peer_id = %peer_state.peer_id,
				number,
				finalized = finalized.number,
				"Peer state is below finality"
			);
			return Ok(None);
		}

		Ok(Some(Worker::new(
			self.worker_ids.next_id(),
			(peer_state.hash, number),
			(peer_state.hash, number),
			Direction::Ascending,
			RequestedData::BOOTSTRAP,
		)))
	}

	pub fn handle_worker_result(&mut self, result: &Worker) -> Result<Option<Worker>, SyncError> {
		let kind = match result.outcome {
			WorkerOutcome::Pending => return Err(SyncError::IncompleteWorker(result.id)),
			WorkerOutcome::Success => return Ok(None),
			// next tick requests the missing ancestors
			WorkerOutcome::Failure(FailureKind::UnknownParent) => return Ok(None),
			WorkerOutcome::Failure(kind) => kind,
		};

		let (mut start_number, mut target_number) = result.bounds()?;
		let (mut start_hash, mut target_hash) = (result.start_hash, result.target_hash);

		let finalized = self.block_state.highest_finalized_header()?;
		let lowest_unfinalized = finalized.number.saturating_add(1);

		match result.direction {
			Direction::Ascending => {
				if target_number <= finalized.number {
					debug!(worker_id = %result.id, %kind, "Dropping failed worker below finality");
					return Ok(None);
				}
				if start_number <= finalized.number {
					start_number = lowest_unfinalized;
					start_hash = H256::zero();
				}
			},
			Direction::Descending => {
				if start_number <= finalized.number {
					debug!(worker_id = %result.id, %kind, "Dropping failed worker below finality");
					return Ok(None);
				}
				if target_number <= finalized.number {
					target_number = lowest_unfinalized;
					target_hash = H256::zero();
				}
			},
		}

		let retry = Worker::new(
			self.worker_ids.next_id(),
			(start_hash, start_number),
			(target_hash, target_number),
			result.direction,
			result.requested_data,
		);
		debug!(
			worker_id = %result.id,
			retry_id = %retry.id,
			%kind,
			start_number,
			target_number,
			"Retrying failed worker"
		);
		Ok(Some(retry))
	}

	/// Checks whether the worker is already covered by one of the in-flight workers.
	pub fn has_current_worker<'a>(
		&self,
		worker: &Worker,
		in_flight: impl IntoIterator<Item = &'a Worker>,
	) -> bool {
		if worker.start_number.is_none() || worker.target_number.is_none() {
			return true;
		}

		in_flight
			.into_iter()
			.any(|existing| worker.is_covered_by(existing))
	}

	/// Scans the pending set, returning workers for the data that is still missing.
	///
	/// Decisions are made against the unmodified set first, so an error leaves it untouched.
	pub fn handle_tick(&mut self) -> Result<Vec<Worker>, SyncError> {
		debug!(pending_blocks = self.pending_blocks.len(), "Handling tick");

		if self.pending_blocks.is_empty() {
			return Ok(vec![]);
		}

		let finalized = self.block_state.highest_finalized_header()?;
		let finalized_hash = finalized.hash();

		let mut promoted = vec![];
		let mut resolved = HashSet::new();
		let mut workers = vec![];

		for block in self.pending_blocks.blocks() {
			if resolved.contains(&block.hash) {
				continue;
			}

			if block
				.number
				.is_some_and(|number| number <= finalized.number)
			{
				// pruned below, once the plan is complete
				continue;
			}

			trace!(hash = ?block.hash, number = ?block.number, "Handling pending block");

			let Some(header) = &block.header else {
				// only hash and number are known, request the block and its ancestors
				workers.push(Worker {
					id: self.worker_ids.next_id(),
					start_hash: block.hash,
					start_number: block.number,
					target_hash: finalized_hash,
					target_number: Some(finalized.number),
					direction: Direction::Descending,
					requested_data: RequestedData::BOOTSTRAP,
					outcome: WorkerOutcome::Pending,
				});
				continue;
			};

			if block.body.is_none() {
				workers.push(Worker {
					id: self.worker_ids.next_id(),
					start_hash: block.hash,
					start_number: block.number,
					target_hash: block.hash,
					target_number: block.number,
					direction: Direction::Ascending,
					requested_data: RequestedData::BODY | RequestedData::JUSTIFICATION,
					outcome: WorkerOutcome::Pending,
				});
				continue;
			}

			let parent_hash = header.parent_hash;
			if resolved.contains(&parent_hash)
				|| self.ready_blocks.contains(&parent_hash)
				|| self.block_state.has_header(parent_hash)?
			{
				resolved.insert(block.hash);
				resolved.extend(self.pending_blocks.ready_descendants(&block.hash));
				promoted.push(block.hash);
				continue;
			}

			let number = block
				.number
				.ok_or(SyncError::NilPendingBlockNumber(block.hash))?;

			// request descending chain from the parent down to the last finalized block
			workers.push(Worker::new(
				self.worker_ids.next_id(),
				(parent_hash, number.saturating_sub(1)),
				(H256::zero(), finalized.number),
				Direction::Descending,
				RequestedData::BOOTSTRAP,
			));
		}

		let stale = self.pending_blocks.remove_lower_blocks(finalized.number);

		for hash in &promoted {
			let Some(block) = self.pending_blocks.remove(hash) else {
				continue;
			};
			match ReadyBlock::try_from(block) {
				Ok(ready) => self.handle_ready_block(ready),
				Err(block) => warn!(hash = ?block.hash, "Cannot promote incomplete block"),
			}
		}

		debug!(
			pruned = stale.len(),
			promoted = resolved.len(),
			workers = workers.len(),
			"Tick handled"
		);
		Ok(workers)
	}

	/// Queues a resolved block, together with every pending descendant it makes resolvable.
	pub fn handle_ready_block(&mut self, block: ReadyBlock) {
		let hash = block.hash();
		self.pending_blocks.remove(&hash);

		trace!(?hash, number = block.number(), "Block is ready");
		self.ready_blocks.push(block);

		for descendant in self.pending_blocks.take_ready_descendants(&hash) {
			match ReadyBlock::try_from(descendant) {
				Ok(ready) => {
					trace!(hash = ?ready.hash(), number = ready.number(), "Descendant is ready");
					self.ready_blocks.push(ready)
				},
				Err(block) => warn!(hash = ?block.hash, "Cannot promote incomplete block"),
			}
		}
	}
}
