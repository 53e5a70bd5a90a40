//! Checkpoint store backends.
//!
//! Backends implement [`CheckpointStore`](super::CheckpointStore) for
//! different storage types.

mod local;
mod memory;
mod remote;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use remote::{CHECKPOINT_TTL, REQUEST_TIMEOUT, RemoteConfig, RemoteStore};
