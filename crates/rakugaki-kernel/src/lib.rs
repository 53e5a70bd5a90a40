//! # rakugaki-kernel
//!
//! Stream reconciliation and checkpoint persistence for incrementally drawn
//! diagrams.
//!
//! An agent streams a JSON array of elements at a rendering surface. Each
//! update may be cut off mid-object, may carry control directives (camera
//! moves, deletions, a checkpoint to resume from), and the finished array is
//! persisted so a later call can pick up where this one left off.
//!
//! ```text
//!   raw string ──► decode ──► reconcile ──► scene ──► RenderSurface
//!                               │    ▲         │
//!                               ▼    │         └─ camera ──► viewport animator
//!                           CheckpointStore
//! ```
//!
//! - [`decode`] - best-effort recovery of truncated arrays
//! - [`reconcile`] - directive partitioning, checkpoint merge, persistence
//! - [`store`] - the checkpoint store trait and its three backends
//! - [`viewport`] - smoothed camera animation and surface coordinates
//! - [`view`] - [`DiagramView`], the per-view entry point

pub mod decode;
pub mod reconcile;
pub mod store;
pub mod view;
pub mod viewport;

pub use decode::{Decoded, Phase, decode};
pub use reconcile::{ReconcileError, Reconciled, Reconciler, SUPPRESSED_OPACITY};
pub use store::{
    CheckpointStore, LocalStore, MemoryStore, RemoteConfig, RemoteStore, SharedCheckpointStore,
    StoreConfig, StoreError, StoreLimits, StoreResult,
};
pub use view::{Cue, CueSink, DiagramView, FinalView, Frame, RenderSurface, ViewError, ViewResult};
pub use viewport::{AnimationLoop, SceneOffset, Tick, ViewportAnimator, scene_offset, to_surface};
