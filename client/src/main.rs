use crate::{
	cli::CliOpts,
	config::RuntimeConfig,
	simulation::{SimulatedChain, SimulatedNetwork},
};
use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use sp_core::H256;
use std::{collections::HashMap, fs, sync::Arc, time::Duration};
use tipsync_core::{
	chain::ChainStore,
	data::{Database, DB},
	finality::BlockState,
	sync_service::{OutputEvent, SyncService},
	types::BlockNumber,
	utils::{
		default_subscriber, install_panic_hooks, json_subscriber, on_user_signal, spawn_in_span,
	},
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, span, Level};
use uuid::Uuid;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod config;
mod simulation;

/// Tip-of-chain sync client running against a simulated peer network

async fn run(cfg: RuntimeConfig, shutdown: CancellationToken) -> Result<()> {
	let version = clap::crate_version!();
	info!("Running tipsync client version: {version}.");
	info!("Using config: {cfg:?}");

	let chain = Arc::new(SimulatedChain::generate(&cfg.simulation));
	let network = Arc::new(SimulatedNetwork::new(chain.clone(), &cfg.simulation));
	let store = ChainStore::new(DB::default(), SimulatedChain::genesis());

	let (event_sender, event_receiver) = mpsc::unbounded_channel();
	let (peer_state_sender, peer_state_receiver) = mpsc::unbounded_channel();

	spawn_in_span(record_events(event_receiver));

	spawn_in_span(simulation::announce(
		network.clone(),
		peer_state_sender,
		cfg.simulation.block_time,
		shutdown.clone(),
	));

	spawn_in_span(simulation::finalize(
		chain.clone(),
		network.clone(),
		store.clone(),
		cfg.simulation.finality_lag,
		cfg.simulation.block_time,
		shutdown.clone(),
	));

	let service = SyncService::new(cfg.sync.clone(), store.clone(), network, event_sender);
	let service_handle = spawn_in_span(service.run(peer_state_receiver, shutdown.clone()));

	let target = cfg.simulation.chain_length;
	tokio::select! {
		result = service_handle => {
			result
				.wrap_err("Sync service task failed")?
				.wrap_err("Sync service failed")?;
			info!("Sync service stopped");
		},
		_ = wait_for_tip(&store, chain.tip(), target) => {
			let finalized = store.highest_finalized_header()?;
			info!(
				target,
				finalized = finalized.number,
				"Synced to the tip of the simulated chain"
			);
			shutdown.cancel();
		},
	}

	Ok(())
}

/// Completes once the canonical tip is imported, logging progress meanwhile.
async fn wait_for_tip(store: &ChainStore<impl Database>, tip: H256, target: BlockNumber) {
	let mut progress = tokio::time::interval(Duration::from_secs(1));
	loop {
		progress.tick().await;
		if store.header(tip).is_some() {
			return;
		}
		match (store.best_header(), store.highest_finalized_header()) {
			(Ok(best), Ok(finalized)) => info!(
				best = best.number,
				finalized = finalized.number,
				target,
				"Sync progress"
			),
			(Err(error), _) | (_, Err(error)) => error!("Cannot read chain state: {error}"),
		}
	}
}

async fn record_events(mut event_receiver: UnboundedReceiver<OutputEvent>) {
	let mut imported = 0;
	let mut failures = HashMap::new();

	while let Some(event) = event_receiver.recv().await {
		match event {
			OutputEvent::RecordPendingBlocks(pending) => debug!(pending, "Pending blocks"),
			OutputEvent::RecordWorkersInFlight(workers) => debug!(workers, "Workers in flight"),
			OutputEvent::RecordImportedBlock(number) => {
				imported += 1;
				debug!(number, imported, "Block imported");
			},
			OutputEvent::CountWorkerFailure(kind) => {
				*failures.entry(kind).or_insert(0usize) += 1;
			},
		}
	}

	info!(imported, ?failures, "Sync events summary");
}

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {}", config_path))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags override the config parameters
	if let Some(seed) = opts.seed {
		cfg.simulation.seed = seed;
	}
	if let Some(peers) = opts.peers {
		cfg.simulation.peers = peers;
	}
	if let Some(chain_length) = opts.chain_length {
		cfg.simulation.chain_length = chain_length;
	}
	if let Some(failure_rate) = opts.failure_rate {
		cfg.simulation.failure_rate = failure_rate;
	}

	cfg.simulation
		.validate()
		.wrap_err("Invalid simulation configuration")?;

	Ok(cfg)
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let shutdown = CancellationToken::new();
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks(shutdown.clone())?;

	let execution_id = Uuid::new_v4();
	let span = span!(Level::INFO, "run", execution_id = execution_id.to_string());
	// Do not enter span if logs format is not JSON
	let _enter = if cfg.log_format_json {
		Some(span.enter())
	} else {
		None
	};

	// spawn a task to watch for ctrl-c signals from user to trigger the shutdown
	spawn_in_span(on_user_signal(shutdown.clone()));

	if let Err(error) = run(cfg, shutdown.clone()).await {
		error!("{error:#}");
		shutdown.cancel();
		return Err(error.wrap_err("Running sync client failed"));
	};

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_override_defaults() {
		let opts = CliOpts::parse_from([
			"tipsync-client",
			"--peers",
			"3",
			"--chain-length",
			"42",
			"--failure-rate",
			"0.5",
			"--verbosity",
			"debug",
		]);
		let cfg = load_runtime_config(&opts).unwrap();

		assert_eq!(cfg.simulation.peers, 3);
		assert_eq!(cfg.simulation.chain_length, 42);
		assert_eq!(cfg.simulation.failure_rate, 0.5);
		assert_eq!(cfg.log_level, Level::DEBUG);
		assert_eq!(cfg.sync.max_workers, 16);
	}

	#[test]
	fn invalid_flags_are_rejected() {
		let opts = CliOpts::parse_from(["tipsync-client", "--failure-rate", "2"]);
		assert!(load_runtime_config(&opts).is_err());
	}

	#[test]
	fn missing_config_file_is_rejected() {
		let opts = CliOpts::parse_from(["tipsync-client", "--config", "does-not-exist.toml"]);
		assert!(load_runtime_config(&opts).is_err());
	}

	#[tokio::test]
	async fn syncs_small_simulated_chain() {
		let mut cfg = RuntimeConfig::default();
		cfg.sync.tick_interval = Duration::from_millis(10);
		cfg.simulation.chain_length = 30;
		cfg.simulation.block_time = Duration::from_millis(2);
		cfg.simulation.request_latency = Duration::ZERO;
		cfg.simulation.failure_rate = 0.1;

		tokio::time::timeout(Duration::from_secs(30), run(cfg, CancellationToken::new()))
			.await
			.unwrap()
			.unwrap();
	}
}
