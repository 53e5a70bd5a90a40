//! Diagram elements and the directives hidden among them.
//!
//! An incoming batch is a flat JSON array. Most entries are drawables whose
//! geometry and style are opaque here; a few `type` values are directives
//! that steer reconciliation and are never rendered:
//!
//! | `type`              | Directive                | Payload                           |
//! |---------------------|--------------------------|-----------------------------------|
//! | `cameraUpdate`      | [`ElementKind::Camera`]  | `x`, `y`, `width`, `height`       |
//! | `delete`            | [`ElementKind::Delete`]  | `ids` (array or comma-separated)  |
//! | `restoreCheckpoint` | [`ElementKind::Restore`] | `id` (alias `checkpointId`)       |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rect::Rect;

pub const CAMERA_UPDATE: &str = "cameraUpdate";
pub const DELETE: &str = "delete";
pub const RESTORE_CHECKPOINT: &str = "restoreCheckpoint";

/// One entry of a batch: a JSON object with at least `type` and `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramElement(Map<String, Value>);

/// Ids named by a delete directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteDirective {
    pub ids: BTreeSet<String>,
}

/// Restore target named by a restore directive. Not yet validated as a
/// checkpoint id; the reconciler does that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreDirective {
    pub checkpoint_id: String,
}

/// Classification of a batch entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Camera(Rect),
    Delete(DeleteDirective),
    Restore(RestoreDirective),
    Drawable,
    /// A directive missing its payload, or an entry without `type`/`id`.
    Malformed(&'static str),
}

impl DiagramElement {
    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn element_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Back-reference to the element this one is attached to (e.g. a label's
    /// container). Never implies ownership.
    pub fn container_id(&self) -> Option<&str> {
        self.0.get("containerId").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// True when this element or its back-reference is named in `ids`.
    pub fn matches_any(&self, ids: &BTreeSet<String>) -> bool {
        self.id().is_some_and(|id| ids.contains(id))
            || self.container_id().is_some_and(|c| ids.contains(c))
    }

    /// Decide what this entry is.
    pub fn classify(&self) -> ElementKind {
        match self.element_type() {
            Some(CAMERA_UPDATE) => self.camera(),
            Some(DELETE) => self.delete(),
            Some(RESTORE_CHECKPOINT) => self.restore(),
            Some(_) if self.id().is_some() => ElementKind::Drawable,
            Some(_) => ElementKind::Malformed("drawable without a string id"),
            None => ElementKind::Malformed("entry without a string type"),
        }
    }

    fn camera(&self) -> ElementKind {
        let (Some(width), Some(height)) = (self.get_f64("width"), self.get_f64("height")) else {
            return ElementKind::Malformed("cameraUpdate needs width and height");
        };
        let rect = Rect::new(
            self.get_f64("x").unwrap_or(0.0),
            self.get_f64("y").unwrap_or(0.0),
            width,
            height,
        );
        if rect.is_usable() {
            ElementKind::Camera(rect)
        } else {
            ElementKind::Malformed("cameraUpdate with non-positive or non-finite size")
        }
    }

    fn delete(&self) -> ElementKind {
        let mut ids = BTreeSet::new();
        match self.0.get("ids").or_else(|| self.0.get("id")) {
            Some(Value::String(joined)) => {
                ids.extend(
                    joined
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                );
            }
            Some(Value::Array(items)) => {
                ids.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                );
            }
            _ => return ElementKind::Malformed("delete needs ids"),
        }
        if ids.is_empty() {
            return ElementKind::Malformed("delete with no usable ids");
        }
        ElementKind::Delete(DeleteDirective { ids })
    }

    fn restore(&self) -> ElementKind {
        match self
            .0
            .get("id")
            .or_else(|| self.0.get("checkpointId"))
            .and_then(Value::as_str)
        {
            Some(id) if !id.is_empty() => ElementKind::Restore(RestoreDirective {
                checkpoint_id: id.to_string(),
            }),
            _ => ElementKind::Malformed("restoreCheckpoint needs an id"),
        }
    }
}

impl From<Map<String, Value>> for DiagramElement {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
