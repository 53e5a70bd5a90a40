//! Checkpoint store operations trait.
//!
//! Every backend exposes the same two operations and runs the same checks
//! before touching storage: id validation ([`parse_id`]) and, for writes, the
//! payload size limit ([`encode_payload`]).

use async_trait::async_trait;

use rakugaki_types::{Checkpoint, CheckpointData, CheckpointId};

use super::{StoreError, StoreResult};

/// Default live-entry ceiling per backend.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Default serialized payload ceiling (5 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Limits every backend enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Live entries kept before the oldest writes are evicted.
    pub max_entries: usize,
    /// Largest serialized document accepted by `save`.
    pub max_payload_bytes: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Core checkpoint store trait.
///
/// Concurrent saves to the same id are last-write-wins. Operations on
/// different ids need no coordination.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `data` under `id`, then evict the oldest surplus entries.
    ///
    /// Validation failures are returned before any write. Eviction is
    /// best-effort and never fails an otherwise successful save.
    async fn save(&self, id: &str, data: &CheckpointData) -> StoreResult<()>;

    /// Load the checkpoint stored under `id`; `Ok(None)` if absent or expired.
    async fn load(&self, id: &str) -> StoreResult<Option<Checkpoint>>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Validate a caller-supplied id.
pub fn parse_id(id: &str) -> StoreResult<CheckpointId> {
    CheckpointId::parse(id).map_err(|reason| StoreError::invalid_id(id, reason))
}

/// Serialize `data` and check it against the payload limit.
pub fn encode_payload(data: &CheckpointData, limits: &StoreLimits) -> StoreResult<Vec<u8>> {
    let bytes = data.to_json_bytes()?;
    if bytes.len() > limits.max_payload_bytes {
        return Err(StoreError::TooLarge {
            size: bytes.len(),
            limit: limits.max_payload_bytes,
        });
    }
    Ok(bytes)
}
