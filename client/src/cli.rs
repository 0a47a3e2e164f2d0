use clap::{command, Parser};
use tipsync_core::types::BlockNumber;
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
	/// Seed of the simulated network
	#[arg(long)]
	pub seed: Option<u64>,
	/// Number of simulated peers
	#[arg(long)]
	pub peers: Option<usize>,
	/// Height of the simulated canonical chain
	#[arg(long)]
	pub chain_length: Option<BlockNumber>,
	/// Fraction of block requests failing in the simulated network
	#[arg(long)]
	pub failure_rate: Option<f64>,
}
