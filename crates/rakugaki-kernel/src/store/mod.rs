//! Checkpoint persistence.
//!
//! Key components:
//!
//! - [`CheckpointStore`] - The two-operation trait (`save`, `load`)
//! - [`MemoryStore`] - Ephemeral in-process map (fallback, testing)
//! - [`LocalStore`] - One JSON document per checkpoint in a directory
//! - [`RemoteStore`] - Hosted key-value store over REST, 30-day expiry
//! - [`StoreConfig`] - Picks one backend once, at startup
//!
//! ## Shared rules
//!
//! - **Id validation first**: ids are checked against the allowed charset and
//!   length before any backend derives a key or filename from them.
//! - **Size limit**: serialized documents over 5 MiB are refused before writing.
//! - **Retention**: each backend keeps at most 100 live entries, evicting the
//!   oldest writes first. Eviction failures are logged, never returned.

pub mod backends;
mod config;
mod error;
mod ops;

pub use backends::{LocalStore, MemoryStore, RemoteConfig, RemoteStore};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use ops::{
    CheckpointStore, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_PAYLOAD_BYTES, StoreLimits, encode_payload,
    parse_id,
};

/// Shared handle to whichever backend was selected.
pub type SharedCheckpointStore = std::sync::Arc<dyn CheckpointStore>;
