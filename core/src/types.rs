//! Shared sync structs and enums.
use codec::{Decode, Encode};
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use sp_core::H256;
use std::time::Duration;

use crate::utils::blake2_256;

pub type BlockNumber = u32;

/// Block header as exchanged with peers and persisted by the chain store.
#[derive(Serialize, Deserialize, Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Header {
	pub parent_hash: H256,
	pub number: BlockNumber,
	pub state_root: H256,
	pub extrinsics_root: H256,
	pub digest: Vec<u8>,
}

impl Header {
	pub fn hash(&self) -> H256 {
		Encode::using_encoded(self, blake2_256).into()
	}
}

/// Opaque block body, the list of encoded extrinsics.
#[derive(Serialize, Deserialize, Encode, Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct Body(pub Vec<Vec<u8>>);

/// Opaque finality justification.
#[derive(Serialize, Deserialize, Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Justification(pub Vec<u8>);

/// Block data returned by peers. Which fields are set depends on the requested data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
	pub hash: H256,
	pub header: Option<Header>,
	pub body: Option<Body>,
	pub justification: Option<Justification>,
}

impl BlockData {
	pub fn number(&self) -> Option<BlockNumber> {
		self.header.as_ref().map(|header| header.number)
	}
}

#[derive(Serialize, Deserialize, Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl From<&str> for PeerId {
	fn from(value: &str) -> Self {
		PeerId(value.to_string())
	}
}

/// Best block announced by a peer.
///
/// Number is optional on the wire, handlers reject announcements without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerState {
	pub peer_id: PeerId,
	pub hash: H256,
	pub number: Option<BlockNumber>,
}

/// Sync service configuration (see `RuntimeConfig` in the client for details)
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SyncConfig {
	/// Interval between pending set scans, in milliseconds (default: 1000).
	#[serde(with = "duration_millis_format")]
	pub tick_interval: Duration,
	/// Maximum number of in-flight workers (default: 16).
	pub max_workers: usize,
	/// Maximum number of blocks kept in the pending set (default: 8192).
	pub max_pending_blocks: usize,
	/// Seconds after which an untouched pending block is dropped (default: 600).
	#[serde(with = "duration_seconds_format")]
	pub pending_block_ttl: Duration,
	/// Maximum number of blocks requested from a peer in a single request (default: 128).
	pub max_response_size: u32,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			tick_interval: Duration::from_millis(1000),
			max_workers: 16,
			max_pending_blocks: 8192,
			pending_block_ttl: Duration::from_secs(600),
			max_response_size: 128,
		}
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

pub mod duration_seconds_format {
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(value))
	}
}

pub mod duration_millis_format {
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}
