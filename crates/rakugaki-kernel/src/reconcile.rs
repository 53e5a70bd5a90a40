//! Scene reconciliation.
//!
//! Turns one decoded batch into the scene to render, merging it against a
//! restored checkpoint when the batch asks for one:
//!
//! ```text
//!   batch ──► partition ──► restore? ──► base − deletes ──► + drawables ──► scene
//!              │  camera (last wins)                          │
//!              │  deletes (union)                             └─ final: save checkpoint
//!              └  restore (first wins)
//! ```
//!
//! Array positions are load-bearing: the renderer diffs each frame against the
//! previous one by index. A drawable deleted later in the *same* batch is
//! therefore kept in place and faded to [`SUPPRESSED_OPACITY`] rather than
//! removed. Base elements from a checkpoint are removed outright.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use rakugaki_types::{
    Checkpoint, CheckpointData, CheckpointId, DiagramElement, ElementKind, Rect, RestoreDirective,
};

use crate::decode::Phase;
use crate::store::{SharedCheckpointStore, StoreError};

/// Opacity given to drawn-then-deleted elements (opacity is on a 0–100 scale).
pub const SUPPRESSED_OPACITY: f64 = 1.0;

/// Reconciliation failures that reach the caller.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(
        "checkpoint {id:?} expired or never existed; start the diagram again without restoreCheckpoint"
    )]
    CheckpointMissing { id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of reconciling one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Drawables in z-order, including suppressed entries.
    pub scene: Vec<DiagramElement>,
    /// Camera for this frame: the batch's last camera directive, else the
    /// restored checkpoint's viewport; final batches fall back to
    /// [`Rect::DEFAULT_CAMERA`].
    pub camera: Option<Rect>,
    /// Id of the checkpoint written for a final batch.
    pub checkpoint_id: Option<CheckpointId>,
    /// Checkpoint the batch was merged onto, if any.
    pub restored_from: Option<CheckpointId>,
    /// Number of drawn-then-deleted entries in `scene`.
    pub suppressed: usize,
    /// Leading `scene` entries that came from the restored checkpoint.
    pub base_len: usize,
}

/// Directives and drawables pulled out of one batch.
#[derive(Debug, Default)]
struct Partition {
    restore: Option<RestoreDirective>,
    camera: Option<Rect>,
    deletes: BTreeSet<String>,
    /// Drawables in order, flagged when a later delete directive names them.
    drawables: Vec<(DiagramElement, bool)>,
}

impl Partition {
    fn split(elements: Vec<DiagramElement>) -> Self {
        let mut part = Partition::default();
        let mut drawables = Vec::new();
        // Delete sets in batch order, paired with the drawable count at that point.
        let mut delete_marks: Vec<(usize, BTreeSet<String>)> = Vec::new();

        for element in elements {
            match element.classify() {
                ElementKind::Drawable => drawables.push(element),
                ElementKind::Camera(rect) => part.camera = Some(rect),
                ElementKind::Delete(directive) => {
                    part.deletes.extend(directive.ids.iter().cloned());
                    delete_marks.push((drawables.len(), directive.ids));
                }
                ElementKind::Restore(directive) => {
                    if part.restore.is_none() {
                        part.restore = Some(directive);
                    } else {
                        tracing::debug!(
                            ignored = %directive.checkpoint_id,
                            "extra restoreCheckpoint ignored"
                        );
                    }
                }
                ElementKind::Malformed(reason) => {
                    tracing::debug!(reason, "skipping malformed element");
                }
            }
        }

        // Walk backwards so each drawable only sees deletes issued after it.
        let mut later: BTreeSet<String> = BTreeSet::new();
        let mut marks = delete_marks.into_iter().rev().peekable();
        let mut flagged = Vec::with_capacity(drawables.len());
        for (index, element) in drawables.into_iter().enumerate().rev() {
            while let Some((_, ids)) = marks.next_if(|(at, _)| *at > index) {
                later.extend(ids);
            }
            let deleted = element.matches_any(&later);
            flagged.push((element, deleted));
        }
        flagged.reverse();
        part.drawables = flagged;
        part
    }
}

/// Reconciles batches for one diagram view against a checkpoint store.
pub struct Reconciler {
    store: SharedCheckpointStore,
    /// Last checkpoint loaded for a restore directive.
    restore_cache: Option<Checkpoint>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store.backend_name())
            .field("restore_cache", &self.restore_cache.as_ref().map(|c| &c.id))
            .finish()
    }
}

impl Reconciler {
    pub fn new(store: SharedCheckpointStore) -> Self {
        Self {
            store,
            restore_cache: None,
        }
    }

    pub fn store(&self) -> &SharedCheckpointStore {
        &self.store
    }

    /// Reconcile one batch.
    ///
    /// Final batches persist the resolved scene under a fresh checkpoint id.
    /// A final batch whose restore target is missing fails with
    /// [`ReconcileError::CheckpointMissing`] and persists nothing.
    #[tracing::instrument(skip(self, elements), fields(count = elements.len()))]
    pub async fn reconcile(
        &mut self,
        elements: Vec<DiagramElement>,
        phase: Phase,
    ) -> Result<Reconciled, ReconcileError> {
        let part = Partition::split(elements);

        let base = match &part.restore {
            Some(directive) => self.resolve_restore(directive, phase).await?,
            None => None,
        };

        let mut scene: Vec<DiagramElement> = Vec::new();
        let mut suppressed: Vec<bool> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        if let Some(base) = &base {
            for element in base.elements() {
                if !matches!(element.classify(), ElementKind::Drawable) {
                    continue;
                }
                if element.matches_any(&part.deletes) {
                    continue;
                }
                place(&mut scene, &mut suppressed, &mut slots, element.clone(), false);
            }
        }

        let base_len = scene.len();

        for (mut element, deleted) in part.drawables {
            if deleted {
                element.set("opacity", SUPPRESSED_OPACITY);
            }
            place(&mut scene, &mut suppressed, &mut slots, element, deleted);
        }

        let restored_viewport = base.as_ref().and_then(Checkpoint::viewport);
        let mut camera = part.camera.or(restored_viewport);
        let restored_from = base.map(|b| b.id);

        let checkpoint_id = if phase.is_final() {
            let viewport = camera.unwrap_or(Rect::DEFAULT_CAMERA);
            camera = Some(viewport);

            let persisted: Vec<DiagramElement> = scene
                .iter()
                .zip(&suppressed)
                .filter(|(_, hidden)| !**hidden)
                .map(|(element, _)| element.clone())
                .collect();
            let id = CheckpointId::generate();
            self.store
                .save(id.as_str(), &CheckpointData::new(persisted, Some(viewport)))
                .await?;
            tracing::info!(checkpoint = %id, elements = scene.len(), "checkpoint saved");
            Some(id)
        } else {
            None
        };

        Ok(Reconciled {
            suppressed: suppressed.iter().filter(|s| **s).count(),
            scene,
            camera,
            checkpoint_id,
            restored_from,
            base_len,
        })
    }

    /// Load (or reuse) the checkpoint a restore directive names.
    async fn resolve_restore(
        &mut self,
        directive: &RestoreDirective,
        phase: Phase,
    ) -> Result<Option<Checkpoint>, ReconcileError> {
        let raw = directive.checkpoint_id.as_str();
        let missing = || ReconcileError::CheckpointMissing { id: raw.to_string() };

        if !phase.is_final() {
            if let Some(cached) = self.restore_cache.as_ref().filter(|c| c.id.as_str() == raw) {
                return Ok(Some(cached.clone()));
            }
        }

        let Ok(id) = CheckpointId::parse(raw) else {
            tracing::debug!(id = raw, "restore target is not a valid checkpoint id");
            return if phase.is_final() { Err(missing()) } else { Ok(None) };
        };

        match self.store.load(id.as_str()).await {
            Ok(Some(checkpoint)) => {
                self.restore_cache = Some(checkpoint.clone());
                Ok(Some(checkpoint))
            }
            Ok(None) if phase.is_final() => Err(missing()),
            Ok(None) => {
                tracing::debug!(checkpoint = %id, "restore target missing; ignored for partial frame");
                Ok(None)
            }
            Err(e) if phase.is_final() => Err(e.into()),
            Err(e) => {
                tracing::warn!(checkpoint = %id, error = %e, "restore load failed for partial frame");
                Ok(None)
            }
        }
    }
}

/// Append `element`, or overwrite the earlier slot holding the same id.
fn place(
    scene: &mut Vec<DiagramElement>,
    suppressed: &mut Vec<bool>,
    slots: &mut HashMap<String, usize>,
    element: DiagramElement,
    hidden: bool,
) {
    let Some(id) = element.id().map(str::to_owned) else {
        return;
    };
    match slots.get(&id) {
        Some(&slot) => {
            tracing::warn!(id = %id, slot, "duplicate element id; later element replaces earlier");
            scene[slot] = element;
            suppressed[slot] = hidden;
        }
        None => {
            slots.insert(id, scene.len());
            scene.push(element);
            suppressed.push(hidden);
        }
    }
}
