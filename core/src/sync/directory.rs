use std::{collections::HashMap, time::Instant};

use super::worker::{Worker, WorkerId};
use crate::types::PeerId;

/// In-flight worker together with the peer it was dispatched to.
#[derive(Debug, Clone)]
pub struct WorkerEntry {
	pub worker: Worker,
	pub peer_id: PeerId,
	pub started_at: Instant,
}

/// Table of in-flight workers, indexed by worker id.
///
/// Owned and mutated by the sync service only.
#[derive(Debug, Default)]
pub struct WorkerDirectory {
	workers: HashMap<WorkerId, WorkerEntry>,
}

impl WorkerDirectory {
	pub fn insert(&mut self, worker: Worker, peer_id: PeerId) -> Option<WorkerEntry> {
		self.workers.insert(
			worker.id,
			WorkerEntry {
				worker,
				peer_id,
				started_at: Instant::now(),
			},
		)
	}

	pub fn remove(&mut self, id: WorkerId) -> Option<WorkerEntry> {
		self.workers.remove(&id)
	}

	pub fn len(&self) -> usize {
		self.workers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.workers.is_empty()
	}

	pub fn workers(&self) -> impl Iterator<Item = &Worker> {
		self.workers.values().map(|entry| &entry.worker)
	}

	/// Number of in-flight workers dispatched to the given peer.
	pub fn peer_load(&self, peer_id: &PeerId) -> usize {
		self.workers
			.values()
			.filter(|entry| &entry.peer_id == peer_id)
			.count()
	}
}
