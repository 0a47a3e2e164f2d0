use crate::types::{BlockNumber, Body, Header, Justification};
use serde::{Deserialize, Serialize};
use sp_core::H256;

mod keys;
use keys::*;

mod mem_db;
pub use mem_db::*;

pub type DB = mem_db::MemoryDB;

/// Type of the database key which we can get from the custom key.
pub trait RecordKey {
	type Type: Serialize + for<'a> Deserialize<'a>;

	/// Returns key
	fn key(&self) -> String;
}

pub trait Database {
	/// Puts value for given key into database.
	/// Key is serialized into database key, value is serialized into type supported by database.
	fn put<T: RecordKey>(&self, key: T, value: T::Type);

	/// Gets value for given key.
	/// Key is serialized into database key, value is deserialized into the given type.
	fn get<T: RecordKey>(&self, key: T) -> Option<T::Type>;
}

pub struct BlockHeaderKey(pub H256);

impl RecordKey for BlockHeaderKey {
	type Type = Header;

	fn key(&self) -> String {
		let BlockHeaderKey(hash) = self;
		format!("{BLOCK_HEADER_KEY_PREFIX}:{}", hex::encode(hash))
	}
}

pub struct BlockBodyKey(pub H256);

impl RecordKey for BlockBodyKey {
	type Type = Body;

	fn key(&self) -> String {
		let BlockBodyKey(hash) = self;
		format!("{BLOCK_BODY_KEY_PREFIX}:{}", hex::encode(hash))
	}
}

pub struct JustificationKey(pub H256);

impl RecordKey for JustificationKey {
	type Type = Justification;

	fn key(&self) -> String {
		let JustificationKey(hash) = self;
		format!("{JUSTIFICATION_KEY_PREFIX}:{}", hex::encode(hash))
	}
}

/// Finalized (canonical) block hash by number.
pub struct BlockHashKey(pub BlockNumber);

impl RecordKey for BlockHashKey {
	type Type = H256;

	fn key(&self) -> String {
		let BlockHashKey(number) = self;
		format!("{BLOCK_HASH_KEY_PREFIX}:{number}")
	}
}

pub struct FinalizedHeaderKey;

impl RecordKey for FinalizedHeaderKey {
	type Type = Header;

	fn key(&self) -> String {
		FINALIZED_HEADER_KEY.into()
	}
}

pub struct BestHeaderKey;

impl RecordKey for BestHeaderKey {
	type Type = Header;

	fn key(&self) -> String {
		BEST_HEADER_KEY.into()
	}
}
