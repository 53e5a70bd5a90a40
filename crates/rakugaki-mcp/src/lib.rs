//! MCP server for streamed, checkpointed diagrams.
//!
//! Agents call `create_view` with a JSON element array; the server reconciles
//! it (restoring and editing an earlier checkpoint when asked), persists the
//! result, and answers with the new checkpoint id. `save_checkpoint` and
//! `read_checkpoint` let a client push an edited scene back and fetch it.
//!
//! ## Module Structure
//!
//! - `models`: Request and response types for MCP tools

mod models;

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use rakugaki_kernel::{DiagramView, SharedCheckpointStore, ViewError};
use rakugaki_types::CheckpointData;

pub use models::*;

/// Format reference returned by `read_me`.
pub const ELEMENT_GUIDE: &str = r#"# Diagram element format

`create_view` takes `elements`: a JSON array string. Entries are drawn in
order; later entries sit on top.

## Drawables
Any object with a string `type` and a unique string `id`, for example:
  {"type":"rectangle","id":"api","x":0,"y":0,"width":160,"height":80}
  {"type":"text","id":"api-label","containerId":"api","x":20,"y":30,"text":"API"}
  {"type":"arrow","id":"a1","x":160,"y":40,"points":[[0,0],[120,0]]}
Geometry and style fields are passed to the renderer untouched.

## Directives (never drawn)
  {"type":"cameraUpdate","x":0,"y":0,"width":800,"height":600}
      Move the camera. The last one in the array wins. Default 0,0,800,600.
  {"type":"delete","ids":["api","a1"]}    ("ids":"api,a1" also works)
      Remove elements drawn earlier, plus anything whose containerId
      names them.
  {"type":"restoreCheckpoint","id":"<checkpointId>"}
      Put first. Starts from a saved diagram instead of an empty one.

## Checkpoints
Every create_view call returns a fresh checkpointId. To edit a diagram,
start the next array with restoreCheckpoint, then add delete directives and
new elements. Checkpoints expire after 30 days or once 100 newer ones exist;
an expired id is reported and you must redraw from scratch.
"#;

/// MCP server over a checkpoint store.
#[derive(Clone)]
pub struct RakugakiMcp {
    store: SharedCheckpointStore,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for RakugakiMcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RakugakiMcp")
            .field("store", &self.store.backend_name())
            .field("tool_router", &self.tool_router)
            .finish()
    }
}

impl RakugakiMcp {
    pub fn new(store: SharedCheckpointStore) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }

    pub fn store(&self) -> &SharedCheckpointStore {
        &self.store
    }
}

#[tool_router]
impl RakugakiMcp {
    #[tool(description = "Returns the diagram element and directive format. Call this before your first create_view.")]
    fn read_me(&self) -> String {
        ELEMENT_GUIDE.to_string()
    }

    #[tool(description = "Draw a diagram from a JSON array of elements. Returns the checkpointId of the saved scene, which a later call can resume with a restoreCheckpoint directive.")]
    #[tracing::instrument(skip(self, req), name = "mcp.create_view")]
    async fn create_view(&self, Parameters(req): Parameters<CreateViewRequest>) -> String {
        let mut view = DiagramView::new(self.store.clone());
        let result = view.on_final_input(&req.elements).await;
        view.teardown();

        match result {
            Ok(done) => {
                let response = CreateViewResponse {
                    checkpoint_id: done.checkpoint_id.to_string(),
                    element_count: done.scene.len(),
                    camera: done.camera,
                    restored_from: done.restored_from.map(|id| id.to_string()),
                };
                match serde_json::to_string(&response) {
                    Ok(json) => json,
                    Err(e) => format!("Error: {e}"),
                }
            }
            Err(ViewError::InvalidInput(msg)) => {
                format!("Error: {msg}. Call read_me for the element format.")
            }
            Err(e) => format!("Error: {e}"),
        }
    }

    #[tool(description = "Save a checkpoint document (typically a scene edited by the user) under the given id.")]
    #[tracing::instrument(skip(self, req), fields(id = %req.id), name = "mcp.save_checkpoint")]
    async fn save_checkpoint(&self, Parameters(req): Parameters<SaveCheckpointRequest>) -> String {
        let data = match CheckpointData::from_json_slice(req.data.as_bytes()) {
            Ok(data) => data,
            Err(e) => return format!("Error: data is not a checkpoint document: {e}"),
        };

        match self.store.save(&req.id, &data).await {
            Ok(()) => serde_json::json!({
                "success": true,
                "checkpointId": req.id,
                "elementCount": data.elements.len(),
            })
            .to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    #[tool(description = "Read a stored checkpoint document by id.")]
    #[tracing::instrument(skip(self, req), fields(id = %req.id), name = "mcp.read_checkpoint")]
    async fn read_checkpoint(&self, Parameters(req): Parameters<ReadCheckpointRequest>) -> String {
        match self.store.load(&req.id).await {
            Ok(Some(checkpoint)) => match serde_json::to_string(&checkpoint.data) {
                Ok(json) => json,
                Err(e) => format!("Error: {e}"),
            },
            Ok(None) => format!("Error: checkpoint {:?} expired or never existed", req.id),
            Err(e) => format!("Error: {e}"),
        }
    }
}

#[tool_handler]
impl ServerHandler for RakugakiMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Rakugaki diagram server. Call read_me for the element format, then create_view to draw. Each create_view returns a checkpointId; start the next array with a restoreCheckpoint directive to edit that diagram.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rakugaki_kernel::store::{LocalStore, MemoryStore};
    use rakugaki_types::Rect;

    fn mcp() -> RakugakiMcp {
        RakugakiMcp::new(Arc::new(MemoryStore::new()))
    }

    async fn create(mcp: &RakugakiMcp, elements: &str) -> String {
        mcp.create_view(Parameters(CreateViewRequest {
            elements: elements.to_string(),
        }))
        .await
    }

    #[test]
    fn test_read_me_mentions_directives() {
        let guide = mcp().read_me();
        for directive in ["cameraUpdate", "delete", "restoreCheckpoint"] {
            assert!(guide.contains(directive), "missing {directive}");
        }
    }

    #[tokio::test]
    async fn test_create_view_returns_checkpoint() {
        let mcp = mcp();
        let result = create(
            &mcp,
            r#"[{"type":"rectangle","id":"a","x":0,"y":0},{"type":"text","id":"b"}]"#,
        )
        .await;

        let response: CreateViewResponse = serde_json::from_str(&result).unwrap();
        assert_eq!(response.element_count, 2);
        assert_eq!(response.camera, Rect::DEFAULT_CAMERA);
        assert_eq!(response.restored_from, None);

        let stored = mcp
            .read_checkpoint(Parameters(ReadCheckpointRequest {
                id: response.checkpoint_id,
            }))
            .await;
        let document: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(document["elements"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_view_restore_and_edit() {
        let mcp = mcp();
        let first: CreateViewResponse = serde_json::from_str(
            &create(
                &mcp,
                r#"[{"type":"rectangle","id":"a"},{"type":"text","id":"b","containerId":"a"},{"type":"ellipse","id":"c"}]"#,
            )
            .await,
        )
        .unwrap();

        let edit = format!(
            r#"[{{"type":"restoreCheckpoint","id":"{}"}},{{"type":"delete","ids":"a"}},{{"type":"diamond","id":"d"}}]"#,
            first.checkpoint_id
        );
        let second: CreateViewResponse = serde_json::from_str(&create(&mcp, &edit).await).unwrap();
        assert_eq!(second.element_count, 2);
        assert_eq!(second.restored_from, Some(first.checkpoint_id));
    }

    #[tokio::test]
    async fn test_create_view_errors_are_text() {
        let mcp = mcp();

        let result = create(&mcp, "not an array").await;
        assert!(result.starts_with("Error: invalid input"), "{result}");
        assert!(result.contains("read_me"));

        let result = create(
            &mcp,
            r#"[{"type":"restoreCheckpoint","id":"nope"},{"type":"rectangle","id":"a"}]"#,
        )
        .await;
        assert!(result.starts_with("Error:"));
        assert!(result.contains("expired or never existed"));
    }

    #[tokio::test]
    async fn test_save_and_read_checkpoint() {
        let mcp = mcp();
        let result = mcp
            .save_checkpoint(Parameters(SaveCheckpointRequest {
                id: "user-edit_1".to_string(),
                data: r#"{"elements":[{"type":"rectangle","id":"a"}],"viewport":{"x":1,"y":2,"width":300,"height":200}}"#.to_string(),
            }))
            .await;
        assert!(result.contains("success"), "{result}");

        let stored = mcp
            .read_checkpoint(Parameters(ReadCheckpointRequest {
                id: "user-edit_1".to_string(),
            }))
            .await;
        let document: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(document["viewport"]["width"], serde_json::json!(300.0));
    }

    #[tokio::test]
    async fn test_save_checkpoint_accepts_legacy_array() {
        let mcp = mcp();
        let result = mcp
            .save_checkpoint(Parameters(SaveCheckpointRequest {
                id: "legacy".to_string(),
                data: r#"[{"type":"rectangle","id":"a"}]"#.to_string(),
            }))
            .await;
        assert!(result.contains("success"), "{result}");

        let stored = mcp
            .read_checkpoint(Parameters(ReadCheckpointRequest {
                id: "legacy".to_string(),
            }))
            .await;
        let document: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert!(document["viewport"].is_null());
    }

    #[tokio::test]
    async fn test_save_checkpoint_rejections() {
        let mcp = mcp();

        let result = mcp
            .save_checkpoint(Parameters(SaveCheckpointRequest {
                id: "../escape".to_string(),
                data: "[]".to_string(),
            }))
            .await;
        assert!(result.starts_with("Error:"), "{result}");

        let result = mcp
            .save_checkpoint(Parameters(SaveCheckpointRequest {
                id: "ok".to_string(),
                data: "{broken".to_string(),
            }))
            .await;
        assert!(result.starts_with("Error: data is not a checkpoint document"));
    }

    #[tokio::test]
    async fn test_read_missing_checkpoint() {
        let result = mcp()
            .read_checkpoint(Parameters(ReadCheckpointRequest {
                id: "missing".to_string(),
            }))
            .await;
        assert!(result.contains("expired or never existed"));
    }

    #[tokio::test]
    async fn test_local_store_backed_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).await.unwrap());
        let mcp = RakugakiMcp::new(store);

        let response: CreateViewResponse = serde_json::from_str(
            &create(&mcp, r#"[{"type":"rectangle","id":"a"}]"#).await,
        )
        .unwrap();
        assert!(
            dir.path()
                .join(format!("{}.json", response.checkpoint_id))
                .is_file()
        );
    }

    #[test]
    fn test_server_info_enables_tools() {
        let info = mcp().get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("create_view"));
    }
}
