//! Sync service, driving the tip syncer with peer announcements, worker results and ticks.
//!
//! # Flow
//!
//! * Peer announcements are recorded and turned into workers
//! * Workers are dispatched to a random peer whose best block covers the worker's range
//! * Each worker fetches its range in chunks, validating every response
//! * Fetched blocks are attached to the local chain if possible, otherwise kept as pending
//! * Ticks prune expired pending blocks and request what the pending set is missing
//! * Ready blocks are imported after every handled input
//!
//! # Notes
//!
//! Workers are dropped if already covered by an in-flight worker, if no peer can serve them,
//! or if the in-flight limit is reached. The next tick schedules what is still missing.
//! Errors from the sync core abort only the input being handled, import errors stop the service.

use color_eyre::{eyre::WrapErr, Result};
use rand::{seq::SliceRandom, thread_rng};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::{
	sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
	time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
	chain::BlockImport,
	finality::{BlockState, BlockStateError},
	network::{self, BlockRequest},
	sync::{
		FailureKind, PendingBlockSet, ReadyBlock, SyncError, TipSyncer, Worker, WorkerDirectory,
		WorkerOutcome,
	},
	types::{BlockData, BlockNumber, PeerId, PeerState, SyncConfig},
	utils::spawn_in_span,
};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
	RecordPendingBlocks(usize),
	RecordWorkersInFlight(usize),
	RecordImportedBlock(BlockNumber),
	CountWorkerFailure(FailureKind),
}

/// Completed worker with the blocks it fetched, possibly partial on failure.
#[derive(Debug)]
pub struct WorkerResult {
	pub worker: Worker,
	pub blocks: Vec<BlockData>,
}

pub struct SyncService<S: BlockState, C> {
	config: SyncConfig,
	tip: TipSyncer<S>,
	client: Arc<C>,
	directory: WorkerDirectory,
	peers: HashMap<PeerId, BlockNumber>,
	result_sender: UnboundedSender<WorkerResult>,
	result_receiver: UnboundedReceiver<WorkerResult>,
	event_sender: UnboundedSender<OutputEvent>,
}

impl<S, C> SyncService<S, C>
where
	S: BlockState + BlockImport,
	C: network::Client + Send + Sync + 'static,
{
	pub fn new(
		config: SyncConfig,
		block_state: S,
		client: Arc<C>,
		event_sender: UnboundedSender<OutputEvent>,
	) -> Self {
		let pending_blocks = PendingBlockSet::new(config.pending_block_ttl);
		let (result_sender, result_receiver) = mpsc::unbounded_channel();
		SyncService {
			config,
			tip: TipSyncer::new(block_state, pending_blocks),
			client,
			directory: WorkerDirectory::default(),
			peers: HashMap::new(),
			result_sender,
			result_receiver,
			event_sender,
		}
	}

	fn send_event(&self, event: OutputEvent) {
		if let Err(error) = self.event_sender.send(event) {
			error!(%error, event_type = "OUTPUT_EVENT_SEND", "Failed to send sync event");
		}
	}

	pub fn handle_peer_state(&mut self, peer_state: PeerState) {
		if let Some(number) = peer_state.number {
			self.peers.insert(peer_state.peer_id.clone(), number);
		}

		match self.tip.is_known(peer_state.hash) {
			Ok(false) => {},
			Ok(true) => {
				trace!(peer_id = %peer_state.peer_id, hash = ?peer_state.hash, "Announced block is known");
				return;
			},
			Err(error) => {
				warn!(peer_id = %peer_state.peer_id, "Cannot handle peer state: {error}");
				return;
			},
		}

		match self.tip.handle_new_peer_state(&peer_state) {
			Ok(Some(worker)) => self.dispatch(worker),
			Ok(None) => {},
			Err(error) => warn!(peer_id = %peer_state.peer_id, "Cannot handle peer state: {error}"),
		}
	}

	pub fn handle_worker_result(&mut self, result: WorkerResult) {
		let WorkerResult { mut worker, blocks } = result;
		let Some(entry) = self.directory.remove(worker.id) else {
			warn!(worker_id = %worker.id, "Result of unknown worker");
			return;
		};

		match self.reconcile(blocks) {
			Ok(false) => {},
			Ok(true) if worker.outcome == WorkerOutcome::Success => {
				worker.outcome = WorkerOutcome::Failure(FailureKind::UnknownParent);
			},
			Ok(true) => {},
			Err(error) => {
				warn!(worker_id = %worker.id, "Cannot reconcile fetched blocks: {error}");
				if worker.outcome == WorkerOutcome::Success {
					worker.outcome = WorkerOutcome::Failure(FailureKind::BlockStateUnavailable);
				}
			},
		}

		debug!(
			worker_id = %worker.id,
			peer_id = %entry.peer_id,
			outcome = ?worker.outcome,
			elapsed = ?entry.started_at.elapsed(),
			"Worker completed"
		);

		if let WorkerOutcome::Failure(kind) = worker.outcome {
			self.send_event(OutputEvent::CountWorkerFailure(kind));
		}

		match self.tip.handle_worker_result(&worker) {
			Ok(Some(retry)) => self.dispatch(retry),
			Ok(None) => {},
			Err(error) => warn!(worker_id = %worker.id, "Cannot handle worker result: {error}"),
		}
	}

	/// Attaches fetched blocks to the chain or keeps them as pending.
	///
	/// Returns `true` if some of the blocks are left waiting for a missing parent.
	fn reconcile(&mut self, mut blocks: Vec<BlockData>) -> Result<bool, SyncError> {
		if blocks.is_empty() {
			return Ok(false);
		}

		let finalized = self.tip.block_state().highest_finalized_header()?;
		// parents first
		blocks.sort_by_key(|block| block.number().unwrap_or(BlockNumber::MAX));

		let mut unknown_parent = false;
		for block in blocks {
			let hash = block.hash;
			if self.tip.is_known(hash)? {
				continue;
			}
			if block
				.number()
				.is_some_and(|number| number <= finalized.number)
			{
				trace!(?hash, "Skipping block on a pruned fork");
				continue;
			}

			let pending = self.tip.pending_blocks();
			if !pending.contains(&hash) {
				if block.header.is_none() {
					trace!(?hash, "Skipping data of unknown block");
					continue;
				}
				if pending.len() >= self.config.max_pending_blocks {
					warn!(?hash, "Pending block set is full, dropping block");
					continue;
				}
			}

			self.tip.pending_blocks_mut().add_block(block);

			let Some(parent_hash) = self
				.tip
				.pending_blocks()
				.get(&hash)
				.filter(|block| block.is_complete())
				.and_then(|block| block.header.as_ref())
				.map(|header| header.parent_hash)
			else {
				continue;
			};

			if !self.tip.is_known(parent_hash)? {
				unknown_parent = true;
				continue;
			}

			let Some(block) = self.tip.pending_blocks_mut().remove(&hash) else {
				continue;
			};
			match ReadyBlock::try_from(block) {
				Ok(ready) => self.tip.handle_ready_block(ready),
				Err(block) => warn!(hash = ?block.hash, "Cannot promote incomplete block"),
			}
		}

		Ok(unknown_parent)
	}

	pub fn handle_tick(&mut self) {
		let expired = self.tip.pending_blocks_mut().prune_expired(Instant::now());
		if !expired.is_empty() {
			debug!(expired = expired.len(), "Pruned expired pending blocks");
		}

		match self.tip.handle_tick() {
			Ok(workers) => {
				for worker in workers {
					self.dispatch(worker);
				}
			},
			Err(error) => warn!("Cannot handle tick: {error}"),
		}

		self.send_event(OutputEvent::RecordPendingBlocks(
			self.tip.pending_blocks().len(),
		));
		self.send_event(OutputEvent::RecordWorkersInFlight(self.directory.len()));
	}

	/// Imports all ready blocks, in queue order.
	pub fn import_ready_blocks(&mut self) -> Result<usize, BlockStateError> {
		let mut imported = 0;
		while let Some(block) = self.tip.ready_blocks_mut().pop() {
			let number = block.number();
			self.tip.block_state().import_block(block)?;
			self.send_event(OutputEvent::RecordImportedBlock(number));
			imported += 1;
		}
		if imported > 0 {
			info!(imported, "Imported ready blocks");
		}
		Ok(imported)
	}

	/// Random least loaded peer whose best block is at or above the worker's highest block.
	fn select_peer(&self, worker: &Worker) -> Option<PeerId> {
		let (start, target) = worker.bounds().ok()?;
		let highest = start.max(target);

		let candidates = self
			.peers
			.iter()
			.filter(|(_, best)| **best >= highest)
			.map(|(peer_id, _)| (peer_id, self.directory.peer_load(peer_id)))
			.collect::<Vec<_>>();

		// spread load across peers serving the range
		let min_load = candidates.iter().map(|(_, load)| *load).min()?;
		let least_loaded = candidates
			.into_iter()
			.filter(|(_, load)| *load == min_load)
			.map(|(peer_id, _)| peer_id)
			.collect::<Vec<_>>();

		least_loaded
			.choose(&mut thread_rng())
			.map(|&peer_id| peer_id.clone())
	}

	fn dispatch(&mut self, worker: Worker) {
		if self.tip.has_current_worker(&worker, self.directory.workers()) {
			trace!(worker_id = %worker.id, "Worker already in flight");
			return;
		}

		if self.directory.len() >= self.config.max_workers {
			debug!(worker_id = %worker.id, "Maximum number of workers reached");
			return;
		}

		let Some(peer_id) = self.select_peer(&worker) else {
			debug!(worker_id = %worker.id, "No peer to dispatch worker to");
			return;
		};

		let requests = match worker.to_requests(self.config.max_response_size) {
			Ok(requests) => requests,
			Err(error) => {
				warn!(worker_id = %worker.id, "Cannot dispatch worker: {error}");
				return;
			},
		};

		debug!(
			worker_id = %worker.id,
			%peer_id,
			direction = %worker.direction,
			start = ?worker.start_number,
			target = ?worker.target_number,
			"Dispatching worker"
		);
		self.directory.insert(worker.clone(), peer_id.clone());

		let client = self.client.clone();
		let result_sender = self.result_sender.clone();
		spawn_in_span(async move {
			let result = fetch(client.as_ref(), peer_id, worker, requests).await;
			if let Err(error) = result_sender.send(result) {
				error!(%error, "Cannot send worker result");
			}
		});
	}

	pub async fn run(
		mut self,
		mut peer_state_receiver: UnboundedReceiver<PeerState>,
		shutdown: CancellationToken,
	) -> Result<()> {
		info!("Starting sync service...");

		let mut ticks = tokio::time::interval(self.config.tick_interval);
		ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = shutdown.cancelled() => {
					info!("Sync service stopped");
					return Ok(());
				},
				peer_state = peer_state_receiver.recv() => match peer_state {
					Some(peer_state) => self.handle_peer_state(peer_state),
					None => {
						info!("Peer state channel closed, stopping sync service");
						return Ok(());
					},
				},
				Some(result) = self.result_receiver.recv() => self.handle_worker_result(result),
				_ = ticks.tick() => self.handle_tick(),
			}

			self.import_ready_blocks()
				.wrap_err("Cannot import ready blocks")?;
		}
	}
}

/// Requests worker's range chunk by chunk, stopping at the first failure.
async fn fetch(
	client: &impl network::Client,
	peer_id: PeerId,
	mut worker: Worker,
	requests: Vec<BlockRequest>,
) -> WorkerResult {
	let mut blocks = vec![];

	for request in requests {
		let response = match client.request_blocks(peer_id.clone(), request.clone()).await {
			Ok(response) => response,
			Err(error) => {
				debug!(worker_id = %worker.id, %peer_id, "Block request failed: {error}");
				worker.outcome = WorkerOutcome::Failure((&error).into());
				return WorkerResult { worker, blocks };
			},
		};

		if let Err(kind) = network::validate_response(&request, &response) {
			debug!(worker_id = %worker.id, %peer_id, %kind, "Invalid block response");
			worker.outcome = WorkerOutcome::Failure(kind);
			return WorkerResult { worker, blocks };
		}
		blocks.extend(response);
	}

	worker.outcome = WorkerOutcome::Success;
	WorkerResult { worker, blocks }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		chain::ChainStore,
		data::{MemoryDB, DB},
		network::{FromBlock, MockClient, RequestError},
		sync::Direction,
		types::{Body, Header},
	};
	use sp_core::H256;
	use std::{
		sync::atomic::{AtomicBool, AtomicUsize, Ordering},
		time::Duration,
	};

	fn genesis() -> Header {
		Header {
			parent_hash: H256::zero(),
			number: 0,
			state_root: H256::zero(),
			extrinsics_root: H256::zero(),
			digest: vec![],
		}
	}

	/// Chain of blocks on top of genesis, genesis included.
	fn chain(len: BlockNumber) -> Vec<BlockData> {
		let mut parent = genesis();
		let mut blocks = vec![BlockData {
			hash: parent.hash(),
			header: Some(parent.clone()),
			body: Some(Body::default()),
			justification: None,
		}];
		for number in 1..=len {
			let header = Header {
				parent_hash: parent.hash(),
				number,
				state_root: H256::zero(),
				extrinsics_root: H256::zero(),
				digest: vec![],
			};
			blocks.push(BlockData {
				hash: header.hash(),
				header: Some(header.clone()),
				body: Some(Body(vec![vec![number as u8]])),
				justification: None,
			});
			parent = header;
		}
		blocks
	}

	/// Answers the request from the given chain, like an honest peer would.
	fn serve(chain: &[BlockData], request: &BlockRequest) -> Vec<BlockData> {
		let start = chain.iter().position(|block| match request.from {
			FromBlock::Hash(hash) => block.hash == hash,
			FromBlock::Number(number) => block.number() == Some(number),
		});
		let Some(start) = start else {
			return vec![];
		};

		let max = request.max as usize;
		match request.direction {
			Direction::Ascending => chain[start..].iter().take(max).cloned().collect(),
			Direction::Descending => chain[..=start].iter().rev().take(max).cloned().collect(),
		}
	}

	fn honest_client(chain: Vec<BlockData>) -> MockClient {
		let mut client = MockClient::new();
		client.expect_request_blocks().returning(move |_, request| {
			let blocks = serve(&chain, &request);
			Box::pin(async move { Ok(blocks) })
		});
		client
	}

	fn service(
		config: SyncConfig,
		client: MockClient,
	) -> (
		SyncService<ChainStore<MemoryDB>, MockClient>,
		ChainStore<MemoryDB>,
		UnboundedReceiver<OutputEvent>,
	) {
		let store = ChainStore::new(DB::default(), genesis());
		let (event_sender, event_receiver) = mpsc::unbounded_channel();
		let service = SyncService::new(config, store.clone(), Arc::new(client), event_sender);
		(service, store, event_receiver)
	}

	fn peer_state(peer_id: &str, block: &BlockData) -> PeerState {
		PeerState {
			peer_id: peer_id.into(),
			hash: block.hash,
			number: block.number(),
		}
	}

	async fn next_result<S: BlockState + BlockImport>(
		service: &mut SyncService<S, MockClient>,
	) -> WorkerResult {
		tokio::time::timeout(Duration::from_secs(5), service.result_receiver.recv())
			.await
			.unwrap()
			.unwrap()
	}

	fn events(receiver: &mut UnboundedReceiver<OutputEvent>) -> Vec<OutputEvent> {
		std::iter::from_fn(|| receiver.try_recv().ok()).collect()
	}

	#[tokio::test]
	async fn announced_block_is_fetched_with_ancestors() {
		let chain = chain(3);
		let (mut service, store, mut event_receiver) =
			service(SyncConfig::default(), honest_client(chain.clone()));

		service.handle_peer_state(peer_state("alice", &chain[3]));
		assert_eq!(service.directory.len(), 1);

		// block 3 arrives without its parent
		let result = next_result(&mut service).await;
		assert_eq!(result.worker.outcome, WorkerOutcome::Success);
		service.handle_worker_result(result);
		assert!(service.tip.pending_blocks().contains(&chain[3].hash));
		assert!(events(&mut event_receiver)
			.contains(&OutputEvent::CountWorkerFailure(FailureKind::UnknownParent)));

		service.handle_tick();
		let worker = service.directory.workers().next().unwrap().clone();
		assert_eq!(worker.direction, Direction::Descending);
		assert_eq!(worker.start_hash, chain[2].hash);
		assert_eq!(worker.target_number, Some(0));

		let result = next_result(&mut service).await;
		service.handle_worker_result(result);
		assert_eq!(service.import_ready_blocks().unwrap(), 3);

		assert!(service.tip.pending_blocks().is_empty());
		assert!(service.directory.is_empty());
		assert_eq!(store.best_header().unwrap().hash(), chain[3].hash);
		assert_eq!(
			events(&mut event_receiver)
				.into_iter()
				.filter(|event| matches!(event, OutputEvent::RecordImportedBlock(_)))
				.collect::<Vec<_>>(),
			vec![
				OutputEvent::RecordImportedBlock(1),
				OutputEvent::RecordImportedBlock(2),
				OutputEvent::RecordImportedBlock(3),
			]
		);
	}

	#[tokio::test]
	async fn failed_worker_is_retried() {
		let chain = chain(1);
		let served = chain.clone();
		let calls = AtomicUsize::new(0);
		let mut client = MockClient::new();
		client.expect_request_blocks().returning(move |_, request| {
			let result = match calls.fetch_add(1, Ordering::SeqCst) {
				0 => Err(RequestError::Timeout),
				_ => Ok(serve(&served, &request)),
			};
			Box::pin(async move { result })
		});
		let (mut service, store, mut event_receiver) = service(SyncConfig::default(), client);

		service.handle_peer_state(peer_state("alice", &chain[1]));
		let result = next_result(&mut service).await;
		let failed_id = result.worker.id;
		assert_eq!(
			result.worker.outcome,
			WorkerOutcome::Failure(FailureKind::Timeout)
		);

		service.handle_worker_result(result);
		assert_eq!(
			events(&mut event_receiver),
			vec![OutputEvent::CountWorkerFailure(FailureKind::Timeout)]
		);
		assert_eq!(service.directory.len(), 1);
		assert!(service.directory.workers().all(|worker| worker.id != failed_id));

		let result = next_result(&mut service).await;
		service.handle_worker_result(result);
		service.import_ready_blocks().unwrap();
		assert_eq!(store.best_header().unwrap().hash(), chain[1].hash);
	}

	/// Chain store whose header lookups fail while `failing` is set.
	#[derive(Clone)]
	struct FlakyStore {
		store: ChainStore<MemoryDB>,
		failing: Arc<AtomicBool>,
	}

	impl BlockState for FlakyStore {
		fn highest_finalized_header(&self) -> Result<Header, BlockStateError> {
			self.store.highest_finalized_header()
		}

		fn has_header(&self, hash: H256) -> Result<bool, BlockStateError> {
			if self.failing.load(Ordering::SeqCst) {
				return Err(BlockStateError::Storage("unavailable".to_string()));
			}
			self.store.has_header(hash)
		}
	}

	impl BlockImport for FlakyStore {
		fn import_block(&self, block: ReadyBlock) -> Result<(), BlockStateError> {
			self.store.import_block(block)
		}
	}

	#[tokio::test]
	async fn fetched_blocks_are_refetched_when_block_state_fails() {
		let chain = chain(1);
		let store = FlakyStore {
			store: ChainStore::new(DB::default(), genesis()),
			failing: Arc::new(AtomicBool::new(false)),
		};
		let (event_sender, mut event_receiver) = mpsc::unbounded_channel();
		let mut service = SyncService::new(
			SyncConfig::default(),
			store.clone(),
			Arc::new(honest_client(chain.clone())),
			event_sender,
		);

		service.handle_peer_state(peer_state("alice", &chain[1]));
		let result = next_result(&mut service).await;
		let fetched_id = result.worker.id;
		assert_eq!(result.worker.outcome, WorkerOutcome::Success);

		store.failing.store(true, Ordering::SeqCst);
		service.handle_worker_result(result);
		assert_eq!(
			events(&mut event_receiver),
			vec![OutputEvent::CountWorkerFailure(
				FailureKind::BlockStateUnavailable
			)]
		);
		assert!(service.tip.pending_blocks().is_empty());
		assert!(service.tip.ready_blocks().is_empty());

		// same block requested again
		let retry = service.directory.workers().next().unwrap().clone();
		assert_ne!(retry.id, fetched_id);
		assert_eq!(retry.start_hash, chain[1].hash);
		assert_eq!(retry.target_number, Some(1));

		store.failing.store(false, Ordering::SeqCst);
		let result = next_result(&mut service).await;
		service.handle_worker_result(result);
		assert_eq!(service.import_ready_blocks().unwrap(), 1);
		assert_eq!(store.store.best_header().unwrap().hash(), chain[1].hash);
		assert!(service.directory.is_empty());
	}

	#[tokio::test]
	async fn workers_need_a_serving_peer() {
		let mut client = MockClient::new();
		client.expect_request_blocks().never();
		let (mut service, _, _events) = service(SyncConfig::default(), client);

		service
			.tip
			.pending_blocks_mut()
			.add_hash_and_number(H256::repeat_byte(1), 5);
		service.handle_tick();
		assert!(service.directory.is_empty());

		// peer behind the requested block
		service.handle_peer_state(PeerState {
			peer_id: "alice".into(),
			hash: H256::repeat_byte(2),
			number: None,
		});
		assert!(service.peers.is_empty());
		service.peers.insert("bob".into(), 4);
		service.handle_tick();
		assert!(service.directory.is_empty());
		assert_eq!(service.tip.pending_blocks().len(), 1);
	}

	#[tokio::test]
	async fn dispatch_respects_in_flight_workers() {
		let mut client = MockClient::new();
		client
			.expect_request_blocks()
			.returning(|_, _| Box::pin(async { Err(RequestError::Timeout) }));
		let config = SyncConfig {
			max_workers: 2,
			..Default::default()
		};
		let (mut service, _, _events) = service(config, client);
		let chain = chain(3);

		service.handle_peer_state(peer_state("alice", &chain[1]));
		// covered by the worker in flight
		service.handle_peer_state(peer_state("bob", &chain[1]));
		assert_eq!(service.directory.len(), 1);

		service.handle_peer_state(peer_state("bob", &chain[2]));
		service.handle_peer_state(peer_state("carol", &chain[3]));
		assert_eq!(service.directory.len(), 2);
		assert_eq!(service.peers.len(), 3);
	}

	#[tokio::test]
	async fn pending_blocks_are_bounded() {
		let config = SyncConfig {
			max_pending_blocks: 1,
			..Default::default()
		};
		let (mut service, _, _events) = service(config, MockClient::new());
		let chain = chain(4);

		// neither block attaches to genesis
		let unknown_parent = service
			.reconcile(vec![chain[4].clone(), chain[2].clone()])
			.unwrap();
		assert!(unknown_parent);
		assert_eq!(service.tip.pending_blocks().len(), 1);
		assert!(service.tip.pending_blocks().contains(&chain[2].hash));
	}

	#[tokio::test]
	async fn known_and_finalized_blocks_are_skipped() {
		let (mut service, store, _events) = service(SyncConfig::default(), MockClient::new());
		let chain = chain(2);

		assert!(!service.reconcile(chain.clone()).unwrap());
		assert_eq!(service.import_ready_blocks().unwrap(), 2);
		store.finalize(chain[2].hash).unwrap();

		let mut fork = chain[1].header.clone().unwrap();
		fork.state_root = H256::repeat_byte(9);
		let fork = BlockData {
			hash: fork.hash(),
			header: Some(fork),
			body: Some(Body::default()),
			justification: None,
		};

		assert!(!service.reconcile(chain).unwrap());
		assert!(!service.reconcile(vec![fork]).unwrap());
		assert!(service.tip.ready_blocks().is_empty());
		assert!(service.tip.pending_blocks().is_empty());
	}

	#[tokio::test]
	async fn run_syncs_until_shutdown() {
		let chain = chain(5);
		let config = SyncConfig {
			tick_interval: Duration::from_millis(10),
			..Default::default()
		};
		let (service, store, _events) = service(config, honest_client(chain.clone()));
		let (peer_state_sender, peer_state_receiver) = mpsc::unbounded_channel();
		let shutdown = CancellationToken::new();

		let handle = tokio::spawn(service.run(peer_state_receiver, shutdown.clone()));
		peer_state_sender
			.send(peer_state("alice", &chain[5]))
			.unwrap();

		tokio::time::timeout(Duration::from_secs(5), async {
			while store.best_header().unwrap().number < 5 {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await
		.unwrap();

		shutdown.cancel();
		handle.await.unwrap().unwrap();
		assert_eq!(store.best_header().unwrap().hash(), chain[5].hash);
	}
}
