//! Persisted scene snapshots.
//!
//! On disk and over the wire a checkpoint document is
//! `{"elements": [...], "viewport": {...} | null}`. Older writers stored a bare
//! array of elements; [`CheckpointData`] still reads that shape, but always
//! writes the object form.

use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize};

use crate::element::DiagramElement;
use crate::ids::CheckpointId;
use crate::rect::Rect;

/// The stored payload of a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckpointData {
    pub elements: Vec<DiagramElement>,
    pub viewport: Option<Rect>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyShape {
    Current {
        elements: Vec<DiagramElement>,
        #[serde(default)]
        viewport: Option<Rect>,
    },
    Legacy(Vec<DiagramElement>),
}

impl<'de> Deserialize<'de> for CheckpointData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match AnyShape::deserialize(deserializer)? {
            AnyShape::Current { elements, viewport } => Self { elements, viewport },
            AnyShape::Legacy(elements) => Self {
                elements,
                viewport: None,
            },
        })
    }
}

impl CheckpointData {
    pub fn new(elements: Vec<DiagramElement>, viewport: Option<Rect>) -> Self {
        Self { elements, viewport }
    }

    /// Serialize to the document bytes a backend stores.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse either document shape.
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A checkpoint as handed back by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub data: CheckpointData,
    /// Write time, when the backend can report one.
    pub saved_at: Option<SystemTime>,
}

impl Checkpoint {
    pub fn elements(&self) -> &[DiagramElement] {
        &self.data.elements
    }

    pub fn viewport(&self) -> Option<Rect> {
        self.data.viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writes_object_shape() {
        let data = CheckpointData::new(
            vec![DiagramElement::from_value(json!({"type": "ellipse", "id": "e"})).unwrap()],
            None,
        );
        let value: serde_json::Value =
            serde_json::from_slice(&data.to_json_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"elements": [{"type": "ellipse", "id": "e"}], "viewport": null})
        );
    }

    #[test]
    fn test_reads_legacy_array() {
        let data = CheckpointData::from_json_slice(br#"[{"type":"text","id":"t"}]"#).unwrap();
        assert_eq!(data.elements.len(), 1);
        assert_eq!(data.viewport, None);
    }

    #[test]
    fn test_reads_viewport() {
        let data = CheckpointData::from_json_slice(
            br#"{"elements":[],"viewport":{"x":1,"y":2,"width":30,"height":40}}"#,
        )
        .unwrap();
        assert_eq!(data.viewport, Some(Rect::new(1.0, 2.0, 30.0, 40.0)));
    }

    #[test]
    fn test_missing_viewport_field() {
        let data = CheckpointData::from_json_slice(br#"{"elements":[]}"#).unwrap();
        assert_eq!(data.viewport, None);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(CheckpointData::from_json_slice(b"{\"nope\":1}").is_err());
        assert!(CheckpointData::from_json_slice(b"42").is_err());
    }
}
