//! Simulated peer network serving a generated forking chain.
//!
//! The canonical chain grows by one block per `block_time`, peers following a fork stop at
//! the fork's tip. Requests fail at the configured rate, and finality follows the canonical
//! chain `finality_lag` blocks behind its head.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sp_core::H256;
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU32, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};
use tipsync_core::{
	chain::ChainStore,
	data::Database,
	finality::BlockState,
	network::{BlockRequest, Client, FromBlock, RequestError},
	sync::{Direction, RequestedData},
	types::{
		duration_millis_format, BlockData, BlockNumber, Body, Header, Justification, PeerId,
		PeerState,
	},
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Seed of the generated chain and of the injected failures (default: 0).
	pub seed: u64,
	/// Number of simulated peers (default: 8).
	pub peers: usize,
	/// Height of the canonical chain (default: 1000).
	pub chain_length: BlockNumber,
	/// Number of forks branching off the canonical chain (default: 4).
	pub forks: usize,
	/// Fraction of block requests that fail, between 0 and 1 (default: 0.05).
	pub failure_rate: f64,
	/// Interval between new canonical blocks, in milliseconds (default: 20).
	#[serde(with = "duration_millis_format")]
	pub block_time: Duration,
	/// Latency of block requests, in milliseconds (default: 5).
	#[serde(with = "duration_millis_format")]
	pub request_latency: Duration,
	/// Distance between the canonical head and the finalized block (default: 10).
	pub finality_lag: BlockNumber,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			seed: 0,
			peers: 8,
			chain_length: 1000,
			forks: 4,
			failure_rate: 0.05,
			block_time: Duration::from_millis(20),
			request_latency: Duration::from_millis(5),
			finality_lag: 10,
		}
	}
}

impl Config {
	pub fn validate(&self) -> Result<()> {
		if self.peers == 0 {
			return Err(eyre!("At least one peer is required"));
		}
		if self.chain_length == 0 {
			return Err(eyre!("Chain length must be positive"));
		}
		if !(0.0..=1.0).contains(&self.failure_rate) {
			return Err(eyre!("Failure rate must be between 0 and 1"));
		}
		Ok(())
	}
}

fn header(rng: &mut ChaCha8Rng, parent_hash: H256, number: BlockNumber) -> Header {
	Header {
		parent_hash,
		number,
		state_root: H256::from(rng.gen::<[u8; 32]>()),
		extrinsics_root: H256::from(rng.gen::<[u8; 32]>()),
		digest: vec![],
	}
}

/// Generated block tree: a canonical chain and short forks off it.
pub struct SimulatedChain {
	blocks: HashMap<H256, BlockData>,
	/// Block hashes by number, for each branch. First branch is canonical.
	branches: Vec<Vec<H256>>,
}

impl SimulatedChain {
	pub fn generate(config: &Config) -> Self {
		let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
		let mut blocks = HashMap::new();

		let mut insert = |rng: &mut ChaCha8Rng, header: Header| {
			let hash = header.hash();
			let body = Body(vec![rng.gen::<[u8; 16]>().to_vec()]);
			let justification = Some(Justification(hash.as_bytes().to_vec()));
			blocks.insert(
				hash,
				BlockData {
					hash,
					header: Some(header),
					body: Some(body),
					justification,
				},
			);
			hash
		};

		let mut canonical = vec![insert(&mut rng, Self::genesis())];
		for number in 1..=config.chain_length {
			let next = header(&mut rng, canonical[number as usize - 1], number);
			canonical.push(insert(&mut rng, next));
		}

		let mut branches = vec![canonical.clone()];
		for _ in 0..config.forks {
			let fork_point = rng.gen_range(0..config.chain_length);
			let mut branch = canonical[..=fork_point as usize].to_vec();
			for number in fork_point + 1..=fork_point + rng.gen_range(1..=3) {
				let next = header(&mut rng, branch[number as usize - 1], number);
				branch.push(insert(&mut rng, next));
			}
			branches.push(branch);
		}

		SimulatedChain { blocks, branches }
	}

	pub fn genesis() -> Header {
		Header {
			parent_hash: H256::zero(),
			number: 0,
			state_root: H256::zero(),
			extrinsics_root: H256::zero(),
			digest: vec![],
		}
	}

	pub fn canonical_hash(&self, number: BlockNumber) -> Option<H256> {
		self.branches[0].get(number as usize).copied()
	}

	pub fn tip(&self) -> H256 {
		*self.branches[0].last().unwrap_or(&H256::zero())
	}

	pub fn branches(&self) -> usize {
		self.branches.len()
	}

	fn block(&self, branch: usize, number: BlockNumber) -> Option<&BlockData> {
		let hash = self.branches.get(branch)?.get(number as usize)?;
		self.blocks.get(hash)
	}
}

struct SimulatedPeer {
	peer_id: PeerId,
	branch: usize,
}

pub struct SimulatedNetwork {
	chain: Arc<SimulatedChain>,
	peers: Vec<SimulatedPeer>,
	height: AtomicU32,
	failure_rate: f64,
	request_latency: Duration,
	rng: Mutex<ChaCha8Rng>,
}

impl SimulatedNetwork {
	pub fn new(chain: Arc<SimulatedChain>, config: &Config) -> Self {
		let peers = (0..config.peers)
			.map(|index| SimulatedPeer {
				peer_id: PeerId(format!("peer-{index}")),
				branch: index % chain.branches(),
			})
			.collect();

		SimulatedNetwork {
			chain,
			peers,
			height: AtomicU32::new(0),
			failure_rate: config.failure_rate,
			request_latency: config.request_latency,
			rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1))),
		}
	}

	pub fn height(&self) -> BlockNumber {
		self.height.load(Ordering::Relaxed)
	}

	/// Produces next canonical block, returning the new height.
	pub fn advance(&self) -> BlockNumber {
		let max = self.chain.branches[0].len() as BlockNumber - 1;
		let height = (self.height() + 1).min(max);
		self.height.store(height, Ordering::Relaxed);
		height
	}

	/// Highest block of the peer's branch at the current height.
	fn visible(&self, peer: &SimulatedPeer) -> BlockNumber {
		let branch_tip = self.chain.branches[peer.branch].len() as BlockNumber - 1;
		branch_tip.min(self.height())
	}

	pub fn peer_states(&self) -> Vec<PeerState> {
		self.peers
			.iter()
			.filter_map(|peer| {
				let number = self.visible(peer);
				let block = self.chain.block(peer.branch, number)?;
				Some(PeerState {
					peer_id: peer.peer_id.clone(),
					hash: block.hash,
					number: Some(number),
				})
			})
			.collect()
	}

	fn injected_failure(&self) -> Option<RequestError> {
		let mut rng = self.rng.lock().ok()?;
		if !rng.gen_bool(self.failure_rate) {
			return None;
		}
		Some(if rng.gen_bool(0.5) {
			RequestError::Timeout
		} else {
			RequestError::Failed("Connection reset by peer".to_string())
		})
	}

	fn serve(&self, peer: &SimulatedPeer, request: &BlockRequest) -> Vec<BlockData> {
		let visible = self.visible(peer);
		let start = match request.from {
			FromBlock::Hash(hash) => {
				let Some(number) = self.chain.blocks.get(&hash).and_then(BlockData::number) else {
					return vec![];
				};
				if self.chain.block(peer.branch, number).map(|block| block.hash) != Some(hash) {
					return vec![];
				}
				number
			},
			FromBlock::Number(number) => number,
		};
		if start > visible {
			return vec![];
		}

		let numbers: Box<dyn Iterator<Item = BlockNumber>> = match request.direction {
			Direction::Ascending => Box::new(start..=visible),
			Direction::Descending => Box::new((0..=start).rev()),
		};

		numbers
			.take(request.max as usize)
			.filter_map(|number| self.chain.block(peer.branch, number))
			.map(|block| BlockData {
				hash: block.hash,
				header: block
					.header
					.clone()
					.filter(|_| request.requested_data.contains(RequestedData::HEADER)),
				body: block
					.body
					.clone()
					.filter(|_| request.requested_data.contains(RequestedData::BODY)),
				justification: block
					.justification
					.clone()
					.filter(|_| request.requested_data.contains(RequestedData::JUSTIFICATION)),
			})
			.collect()
	}
}

#[async_trait]
impl Client for SimulatedNetwork {
	async fn request_blocks(
		&self,
		peer_id: PeerId,
		request: BlockRequest,
	) -> Result<Vec<BlockData>, RequestError> {
		tokio::time::sleep(self.request_latency).await;

		let Some(peer) = self.peers.iter().find(|peer| peer.peer_id == peer_id) else {
			return Err(RequestError::Failed(format!("Unknown peer {peer_id}")));
		};

		if let Some(error) = self.injected_failure() {
			trace!(%peer_id, "Injected request failure: {error}");
			return Err(error);
		}

		Ok(self.serve(peer, &request))
	}
}

/// Grows the chain and gossips every peer's best block on each block time.
pub async fn announce(
	network: Arc<SimulatedNetwork>,
	peer_state_sender: UnboundedSender<PeerState>,
	block_time: Duration,
	shutdown: CancellationToken,
) {
	let mut ticks = tokio::time::interval(block_time);
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = ticks.tick() => {},
		}

		let height = network.advance();
		trace!(height, "Announcing peer states");
		for peer_state in network.peer_states() {
			if peer_state_sender.send(peer_state).is_err() {
				info!("Peer state receiver closed, stopping announcements");
				return;
			}
		}
	}
}

/// Finalizes canonical blocks lagging behind the network height, once they are imported.
pub async fn finalize(
	chain: Arc<SimulatedChain>,
	network: Arc<SimulatedNetwork>,
	store: ChainStore<impl Database>,
	finality_lag: BlockNumber,
	block_time: Duration,
	shutdown: CancellationToken,
) {
	let mut ticks = tokio::time::interval(block_time);
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = ticks.tick() => {},
		}

		let Some(number) = network.height().checked_sub(finality_lag) else {
			continue;
		};
		let Some(hash) = chain.canonical_hash(number) else {
			continue;
		};

		let finalized = match store.highest_finalized_header() {
			Ok(header) => header,
			Err(error) => {
				warn!("Cannot read finalized header: {error}");
				continue;
			},
		};
		if number <= finalized.number || store.header(hash).is_none() {
			continue;
		}

		match store.finalize(hash) {
			Ok(header) => debug!(number = header.number, ?hash, "Finalized block"),
			Err(error) => warn!(number, "Cannot finalize block: {error}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;
	use tipsync_core::network::validate_response;

	fn config() -> Config {
		Config {
			chain_length: 50,
			failure_rate: 0.0,
			request_latency: Duration::ZERO,
			..Default::default()
		}
	}

	#[test]
	fn generation_is_deterministic() {
		let first = SimulatedChain::generate(&config());
		let second = SimulatedChain::generate(&config());
		let other = SimulatedChain::generate(&Config {
			seed: 7,
			..config()
		});

		assert_eq!(first.tip(), second.tip());
		assert_ne!(first.tip(), other.tip());
		assert_eq!(first.branches(), 5);
	}

	#[test]
	fn branches_are_chains_from_genesis() {
		let chain = SimulatedChain::generate(&config());
		for branch in 0..chain.branches() {
			let mut parent_hash = H256::zero();
			for (number, hash) in chain.branches[branch].iter().enumerate() {
				let header = chain.blocks[hash].header.as_ref().unwrap();
				assert_eq!(header.number as usize, number);
				assert_eq!(header.parent_hash, parent_hash);
				parent_hash = *hash;
			}
		}
		assert_eq!(chain.branches[0][0], SimulatedChain::genesis().hash());
	}

	#[test]
	fn peers_announce_visible_blocks() {
		let chain = Arc::new(SimulatedChain::generate(&config()));
		let network = SimulatedNetwork::new(chain.clone(), &config());
		for _ in 0..5 {
			network.advance();
		}

		let states = network.peer_states();
		assert_eq!(states.len(), 8);
		assert!(states.iter().all(|state| state.number <= Some(5)));
		assert_eq!(states[0].hash, chain.canonical_hash(5).unwrap());
	}

	#[test_case(Direction::Ascending, FromBlock::Number(3), 4 => 4; "ascending")]
	#[test_case(Direction::Ascending, FromBlock::Number(8), 4 => 3; "ascending up to height")]
	#[test_case(Direction::Descending, FromBlock::Number(10), 20 => 11; "descending down to genesis")]
	#[test_case(Direction::Ascending, FromBlock::Number(11), 4 => 0; "above height")]
	fn canonical_peer_serves_valid_chains(direction: Direction, from: FromBlock, max: u32) -> usize {
		let chain = Arc::new(SimulatedChain::generate(&config()));
		let network = SimulatedNetwork::new(chain, &config());
		for _ in 0..10 {
			network.advance();
		}

		let request = BlockRequest {
			from,
			direction,
			max,
			requested_data: RequestedData::BOOTSTRAP,
		};
		let blocks = network.serve(&network.peers[0], &request);
		if !blocks.is_empty() {
			assert_eq!(validate_response(&request, &blocks), Ok(()));
		}
		blocks.len()
	}

	#[test]
	fn requested_data_is_filtered() {
		let chain = Arc::new(SimulatedChain::generate(&config()));
		let network = SimulatedNetwork::new(chain.clone(), &config());
		network.advance();

		let hash = chain.canonical_hash(1).unwrap();
		let request = BlockRequest {
			from: FromBlock::Hash(hash),
			direction: Direction::Ascending,
			max: 1,
			requested_data: RequestedData::BODY,
		};
		let blocks = network.serve(&network.peers[0], &request);
		assert_eq!(blocks.len(), 1);
		assert!(blocks[0].header.is_none());
		assert!(blocks[0].body.is_some());
		assert!(blocks[0].justification.is_none());
	}

	#[tokio::test]
	async fn failures_are_injected() {
		let config = Config {
			failure_rate: 1.0,
			..config()
		};
		let chain = Arc::new(SimulatedChain::generate(&config));
		let network = SimulatedNetwork::new(chain, &config);
		network.advance();

		let request = BlockRequest {
			from: FromBlock::Number(1),
			direction: Direction::Ascending,
			max: 1,
			requested_data: RequestedData::BOOTSTRAP,
		};
		for _ in 0..10 {
			assert!(network
				.request_blocks("peer-0".into(), request.clone())
				.await
				.is_err());
		}
		assert!(matches!(
			network.request_blocks("nobody".into(), request).await,
			Err(RequestError::Failed(_))
		));
	}

	#[test]
	fn invalid_config_is_rejected() {
		assert!(Config::default().validate().is_ok());
		assert!(Config {
			failure_rate: 1.5,
			..Default::default()
		}
		.validate()
		.is_err());
		assert!(Config {
			peers: 0,
			..Default::default()
		}
		.validate()
		.is_err());
	}
}
