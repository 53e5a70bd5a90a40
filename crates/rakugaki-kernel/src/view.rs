//! Per-view session.
//!
//! A [`DiagramView`] is what the tool-calling transport talks to. It owns one
//! [`Reconciler`], one animated viewport, and the bookkeeping for which
//! drawables have already been seen during the current stream:
//!
//! - [`DiagramView::on_partial_input`] decodes a mid-stream string, reconciles
//!   it without persisting, jitters and cues newly appearing drawables, and
//!   hands a [`Frame`] to the [`RenderSurface`].
//! - [`DiagramView::on_final_input`] reconciles the complete string, persists
//!   the checkpoint, renders, and returns the new checkpoint id.
//! - [`DiagramView::teardown`] stops animation; every later call fails with
//!   [`ViewError::TornDown`] before reaching the store.
//!
//! Render failures never propagate. They are logged and the view carries on.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::watch;

use rakugaki_types::{CheckpointId, DiagramElement, ElementKind, Rect};

use crate::decode::{Decoded, Phase, decode};
use crate::reconcile::{ReconcileError, Reconciled, Reconciler};
use crate::store::SharedCheckpointStore;
use crate::viewport::{AnimationLoop, Tick, ViewportAnimator, scene_offset, to_surface};

/// Field carrying the renderer's per-element randomness.
pub const SEED_FIELD: &str = "seed";

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("diagram view has been torn down")]
    TornDown,
}

pub type ViewResult<T> = Result<T, ViewError>;

/// Everything the rendering surface needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub phase: Phase,
    /// Drawables in z-order, suppressed entries included.
    pub scene: Vec<DiagramElement>,
    /// Animated viewport in scene coordinates.
    pub viewport: Option<Rect>,
    /// `viewport` shifted into the renderer's output coordinates.
    pub surface_viewport: Option<Rect>,
}

/// External renderer.
pub trait RenderSurface: Send {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

/// One newly streamed drawable, for accompanying feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub element_id: String,
    pub element_type: String,
}

pub trait CueSink: Send {
    fn cue(&mut self, cue: Cue);
}

/// Result of a finalized input.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalView {
    pub checkpoint_id: CheckpointId,
    pub scene: Vec<DiagramElement>,
    pub camera: Rect,
    pub restored_from: Option<CheckpointId>,
}

pub struct DiagramView {
    reconciler: Reconciler,
    animator: ViewportAnimator,
    animation: Option<AnimationLoop>,
    surface: Option<Box<dyn RenderSurface>>,
    cues: Option<Box<dyn CueSink>>,
    /// Seed assigned to each drawable seen so far in this stream.
    seeds: HashMap<String, u32>,
    rng: StdRng,
    torn_down: bool,
}

impl std::fmt::Debug for DiagramView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramView")
            .field("reconciler", &self.reconciler)
            .field("animator", &self.animator)
            .field("seen", &self.seeds.len())
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl DiagramView {
    pub fn new(store: SharedCheckpointStore) -> Self {
        Self {
            reconciler: Reconciler::new(store),
            animator: ViewportAnimator::new(),
            animation: None,
            surface: None,
            cues: None,
            seeds: HashMap::new(),
            rng: StdRng::from_entropy(),
            torn_down: false,
        }
    }

    pub fn with_surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn with_cue_sink(mut self, sink: impl CueSink + 'static) -> Self {
        self.cues = Some(Box::new(sink));
        self
    }

    /// Deterministic jitter, for tests and replays.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Drive the viewport from a background task instead of [`Self::tick`].
    ///
    /// The task takes over the view's animator, so frames and
    /// [`Self::viewport`] report the rectangle it animates. Must be called
    /// inside a tokio runtime. Returns the receiver of animated rectangles.
    pub fn spawn_animation(&mut self, frame_interval: Duration) -> watch::Receiver<Option<Rect>> {
        let animator = std::mem::take(&mut self.animator);
        let animation = AnimationLoop::spawn_with(animator, frame_interval);
        let frames = animation.frames();
        if let Some(previous) = self.animation.replace(animation) {
            previous.cancel();
        }
        frames
    }

    /// Advance the owned animator by one frame. Idle once
    /// [`Self::spawn_animation`] has handed the animator to a task.
    pub fn tick(&mut self) -> Tick {
        if self.torn_down || self.animation.is_some() {
            return Tick::Idle;
        }
        self.animator.tick()
    }

    /// Current animated viewport.
    pub fn viewport(&self) -> Option<Rect> {
        match &self.animation {
            // Until the task publishes, the snapped first target stands in.
            Some(animation) => animation.current().or(self.animator.current()),
            None => self.animator.current(),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Handle a mid-stream update.
    ///
    /// Returns the rendered frame, or `None` when nothing in `raw` is safe to
    /// draw yet.
    #[tracing::instrument(skip(self, raw), fields(len = raw.len()))]
    pub async fn on_partial_input(&mut self, raw: &str) -> ViewResult<Option<Frame>> {
        self.ensure_live()?;

        let elements = match decode(raw, Phase::Partial) {
            Decoded::Empty => return Ok(None),
            decoded => decoded.into_elements(),
        };

        let mut reconciled = self.reconciler.reconcile(elements, Phase::Partial).await?;
        self.apply_seeds(&mut reconciled);
        self.retarget(reconciled.camera);

        let frame = self.frame(Phase::Partial, reconciled.scene);
        self.render(&frame);
        Ok(Some(frame))
    }

    /// Handle the complete update: persist and render.
    #[tracing::instrument(skip(self, raw), fields(len = raw.len()))]
    pub async fn on_final_input(&mut self, raw: &str) -> ViewResult<FinalView> {
        self.ensure_live()?;

        let elements = match decode(raw, Phase::Final) {
            Decoded::Empty => {
                return Err(ViewError::InvalidInput(
                    "elements must be a JSON array containing at least one element object"
                        .to_string(),
                ));
            }
            decoded => decoded.into_elements(),
        };
        let elements = self.carry_seeds(elements);

        let reconciled = self.reconciler.reconcile(elements, Phase::Final).await?;
        let camera = reconciled.camera.unwrap_or(Rect::DEFAULT_CAMERA);
        let Some(checkpoint_id) = reconciled.checkpoint_id else {
            return Err(ViewError::InvalidInput(
                "final input produced no checkpoint".to_string(),
            ));
        };
        self.retarget(Some(camera));

        let frame = self.frame(Phase::Final, reconciled.scene);
        self.render(&frame);

        // The next stream starts fresh.
        self.seeds.clear();

        Ok(FinalView {
            checkpoint_id,
            scene: frame.scene,
            camera,
            restored_from: reconciled.restored_from,
        })
    }

    /// Cancel pending animation and refuse further input.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.animator.cancel();
        if let Some(animation) = self.animation.take() {
            animation.cancel();
        }
        tracing::debug!("diagram view torn down");
    }

    fn ensure_live(&self) -> ViewResult<()> {
        if self.torn_down {
            Err(ViewError::TornDown)
        } else {
            Ok(())
        }
    }

    /// Stamp drawables already shown during this stream with their seed.
    fn carry_seeds(&self, mut elements: Vec<DiagramElement>) -> Vec<DiagramElement> {
        if self.seeds.is_empty() {
            return elements;
        }
        for element in &mut elements {
            if !matches!(element.classify(), ElementKind::Drawable) {
                continue;
            }
            let seed = element.id().and_then(|id| self.seeds.get(id)).copied();
            if let Some(seed) = seed {
                element.set(SEED_FIELD, seed);
            }
        }
        elements
    }

    /// Give every drawable its stable seed, drawing fresh ones (and cueing)
    /// for drawables streamed in for the first time.
    fn apply_seeds(&mut self, reconciled: &mut Reconciled) {
        for (index, element) in reconciled.scene.iter_mut().enumerate() {
            let Some(id) = element.id().map(str::to_owned) else {
                continue;
            };
            let from_base = index < reconciled.base_len;

            if let Some(&seed) = self.seeds.get(&id) {
                if !from_base {
                    element.set(SEED_FIELD, seed);
                }
                continue;
            }

            if from_base {
                // Restored elements keep their persisted seed and play no cue.
                let seed = element
                    .get(SEED_FIELD)
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or_else(|| self.rng.r#gen());
                self.seeds.insert(id, seed);
                continue;
            }

            let seed: u32 = self.rng.r#gen();
            element.set(SEED_FIELD, seed);
            let element_type = element.element_type().unwrap_or_default().to_string();
            self.seeds.insert(id.clone(), seed);

            if let Some(sink) = self.cues.as_mut() {
                sink.cue(Cue {
                    element_id: id,
                    element_type,
                });
            }
        }
    }

    fn retarget(&mut self, camera: Option<Rect>) {
        let Some(camera) = camera else {
            return;
        };
        match &self.animation {
            Some(animation) => {
                if animation.current().is_none() && self.animator.current().is_none() {
                    // First target snaps; keep it visible before the task runs.
                    self.animator.set_target(camera);
                }
                animation.retarget(camera);
            }
            None => {
                self.animator.set_target(camera);
            }
        }
    }

    fn frame(&self, phase: Phase, scene: Vec<DiagramElement>) -> Frame {
        let viewport = self.viewport();
        let surface_viewport = viewport.map(|v| to_surface(v, scene_offset(&scene)));
        Frame {
            phase,
            scene,
            viewport,
            surface_viewport,
        }
    }

    fn render(&mut self, frame: &Frame) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if let Err(e) = surface.render(frame) {
            tracing::warn!(error = %e, phase = ?frame.phase, "render failed; frame dropped");
        }
    }
}

impl Drop for DiagramView {
    fn drop(&mut self) {
        self.teardown();
    }
}
