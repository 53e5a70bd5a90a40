//! MCP request and response types.

use rmcp::schemars;
use serde::{Deserialize, Serialize};

use rakugaki_types::Rect;

// ============================================================================
// Request Types
// ============================================================================

/// Draw a diagram from a complete element array.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateViewRequest {
    /// JSON array of elements and directives
    #[schemars(
        description = "JSON array string of diagram elements. May start with a restoreCheckpoint directive and include cameraUpdate and delete directives. Call read_me first for the format."
    )]
    pub elements: String,
}

/// Store a client-edited scene under a chosen id.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveCheckpointRequest {
    /// Checkpoint id
    #[schemars(description = "Checkpoint id: letters, digits, '-' or '_', at most 64 characters")]
    pub id: String,
    /// Checkpoint document
    #[schemars(
        description = "JSON string of the checkpoint document: {\"elements\": [...], \"viewport\": {...} | null}. A bare element array is also accepted."
    )]
    pub data: String,
}

/// Fetch a stored checkpoint.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadCheckpointRequest {
    #[schemars(description = "Checkpoint id returned by create_view or passed to save_checkpoint")]
    pub id: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateViewResponse {
    pub checkpoint_id: String,
    pub element_count: usize,
    pub camera: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<String>,
}
