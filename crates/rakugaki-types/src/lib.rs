//! Shared element, camera, and checkpoint types for rakugaki.
//!
//! A leaf crate with no internal dependencies: the kernel and the MCP server
//! both build on it.
//!
//! # Key Types
//!
//! |------------------------|----------------------------------------------|
//! | Type                   | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | [`DiagramElement`]     | One batch entry (drawable or directive)      |
//! | [`ElementKind`]        | Classification of an entry                   |
//! | [`Rect`]               | Camera / viewport rectangle                  |
//! | [`CheckpointId`]       | Validated storage-safe identifier            |
//! | [`CheckpointData`]     | Persisted `{elements, viewport}` document    |
//! | [`Checkpoint`]         | A loaded checkpoint with its write time      |
//! |------------------------|----------------------------------------------|

pub mod checkpoint;
pub mod element;
pub mod ids;
pub mod rect;

pub use checkpoint::{Checkpoint, CheckpointData};
pub use element::{
    CAMERA_UPDATE, DELETE, DeleteDirective, DiagramElement, ElementKind, RESTORE_CHECKPOINT,
    RestoreDirective,
};
pub use ids::{CheckpointId, InvalidCheckpointId, MAX_CHECKPOINT_ID_LEN};
pub use rect::Rect;
