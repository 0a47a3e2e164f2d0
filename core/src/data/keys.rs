/// Keys predefined for persistance:
/// Prefix used with Block Header key
pub const BLOCK_HEADER_KEY_PREFIX: &str = "block_header";
/// Prefix used with Block Body key
pub const BLOCK_BODY_KEY_PREFIX: &str = "block_body";
/// Prefix used with Justification key
pub const JUSTIFICATION_KEY_PREFIX: &str = "justification";
/// Prefix used with canonical Block Hash key
pub const BLOCK_HASH_KEY_PREFIX: &str = "block_hash";
/// Key for storing the highest finalized header
pub const FINALIZED_HEADER_KEY: &str = "finalized_header";
/// Key for storing the best imported header
pub const BEST_HEADER_KEY: &str = "best_header";
