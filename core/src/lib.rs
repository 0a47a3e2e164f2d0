//! Tip-of-chain block synchronization.
//!
//! [`sync::TipSyncer`] decides which block ranges to fetch, [`sync_service::SyncService`]
//! dispatches them to peers and imports what becomes attachable to the local chain.

pub mod chain;
pub mod data;
pub mod finality;
pub mod network;
pub mod sync;
pub mod sync_service;
pub mod types;
pub mod utils;
