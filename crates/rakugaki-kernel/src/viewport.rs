//! Smoothed viewport animation.
//!
//! [`ViewportAnimator`] is the per-view animation state: the host calls
//! [`ViewportAnimator::set_target`] whenever a new camera arrives and
//! [`ViewportAnimator::tick`] once per frame. Each tick moves every component
//! a fixed fraction of the remaining distance; once the summed distance drops
//! below the settle threshold the animator stops asking for ticks.
//!
//! [`AnimationLoop`] drives an animator from a tokio task for hosts without
//! their own frame loop.
//!
//! Scene-to-surface conversion is separate and stateless: the renderer
//! re-origins its output to the padded bounding box of the drawables, so the
//! camera has to be shifted by [`scene_offset`] before it is applied.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use rakugaki_types::{DiagramElement, Rect};

/// Fraction of the remaining distance covered per tick.
pub const SMOOTHING: f64 = 0.03;

/// Summed absolute delta below which animation stops.
pub const SETTLE_THRESHOLD: f64 = 0.5;

/// Padding the renderer adds around the drawables' bounding box.
pub const SURFACE_PADDING: f64 = 10.0;

/// Default frame interval for [`AnimationLoop`] (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// No tick was scheduled.
    Idle,
    /// Moved; another tick is scheduled.
    Moving(Rect),
    /// Moved and came within the settle threshold; no further tick scheduled.
    Settled(Rect),
}

/// Animated viewport state for one diagram view.
#[derive(Debug, Clone)]
pub struct ViewportAnimator {
    current: Option<Rect>,
    target: Option<Rect>,
    /// At most one tick is ever outstanding.
    tick_pending: bool,
    smoothing: f64,
    threshold: f64,
}

impl Default for ViewportAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportAnimator {
    pub fn new() -> Self {
        Self::with_params(SMOOTHING, SETTLE_THRESHOLD)
    }

    pub fn with_params(smoothing: f64, threshold: f64) -> Self {
        Self {
            current: None,
            target: None,
            tick_pending: false,
            smoothing,
            threshold,
        }
    }

    /// The animated rectangle, once any target has been seen.
    pub fn current(&self) -> Option<Rect> {
        self.current
    }

    pub fn target(&self) -> Option<Rect> {
        self.target
    }

    /// Whether a tick is scheduled.
    pub fn is_animating(&self) -> bool {
        self.tick_pending
    }

    /// Point the animation at a new target.
    ///
    /// The very first target snaps; later ones re-target from wherever the
    /// animation currently is. Returns whether a tick is now scheduled.
    pub fn set_target(&mut self, target: Rect) -> bool {
        self.target = Some(target);
        match self.current {
            None => {
                self.current = Some(target);
                self.tick_pending = false;
            }
            Some(current) => {
                self.tick_pending = current.total_delta(&target) >= self.threshold;
            }
        }
        self.tick_pending
    }

    /// Advance one frame.
    pub fn tick(&mut self) -> Tick {
        let (true, Some(current), Some(target)) = (self.tick_pending, self.current, self.target)
        else {
            return Tick::Idle;
        };

        let k = self.smoothing;
        let next = Rect::new(
            current.x + (target.x - current.x) * k,
            current.y + (target.y - current.y) * k,
            current.width + (target.width - current.width) * k,
            current.height + (target.height - current.height) * k,
        );
        self.current = Some(next);

        if next.total_delta(&target) < self.threshold {
            self.tick_pending = false;
            Tick::Settled(next)
        } else {
            Tick::Moving(next)
        }
    }

    /// Drop any scheduled tick (view teardown).
    pub fn cancel(&mut self) {
        self.tick_pending = false;
    }
}

/// Minimum x/y over all drawable geometry, including relative `points`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneOffset {
    pub x: f64,
    pub y: f64,
}

/// Compute the renderer's origin shift for a set of drawables.
///
/// Recompute whenever the drawable set changes. Elements without numeric
/// `x`/`y` are ignored; an empty scene has a zero offset.
pub fn scene_offset(elements: &[DiagramElement]) -> SceneOffset {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;

    for element in elements {
        let (Some(x), Some(y)) = (element.get_f64("x"), element.get_f64("y")) else {
            continue;
        };
        min_x = min_x.min(x);
        min_y = min_y.min(y);

        let points = element.get("points").and_then(|p| p.as_array());
        for point in points.into_iter().flatten() {
            let Some(pair) = point.as_array() else {
                continue;
            };
            if let (Some(px), Some(py)) = (
                pair.first().and_then(|v| v.as_f64()),
                pair.get(1).and_then(|v| v.as_f64()),
            ) {
                min_x = min_x.min(x + px);
                min_y = min_y.min(y + py);
            }
        }
    }

    if min_x.is_finite() && min_y.is_finite() {
        SceneOffset { x: min_x, y: min_y }
    } else {
        SceneOffset::default()
    }
}

/// Map a scene-space viewport onto the renderer's output coordinates.
pub fn to_surface(viewport: Rect, offset: SceneOffset) -> Rect {
    Rect::new(
        viewport.x - offset.x + SURFACE_PADDING,
        viewport.y - offset.y + SURFACE_PADDING,
        viewport.width,
        viewport.height,
    )
}

/// A tokio task that owns a [`ViewportAnimator`] and ticks it on a timer.
///
/// Targets go in through [`AnimationLoop::retarget`] and are applied in the
/// order sent, so the first-target snap holds even when several targets are
/// queued before the task first runs. Animated rectangles come out of
/// [`AnimationLoop::frames`], which only keeps the latest one. The timer only
/// runs while the animator has a tick scheduled, and a new target resets it
/// instead of adding a second one.
#[derive(Debug)]
pub struct AnimationLoop {
    targets: mpsc::UnboundedSender<Rect>,
    frames: watch::Receiver<Option<Rect>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AnimationLoop {
    /// Spawn on the current tokio runtime with a fresh animator.
    pub fn spawn(frame_interval: Duration) -> Self {
        Self::spawn_with(ViewportAnimator::new(), frame_interval)
    }

    /// Spawn on the current tokio runtime, taking over `animator` as is.
    ///
    /// Its current rectangle is published immediately and an animation
    /// already in flight carries on.
    pub fn spawn_with(animator: ViewportAnimator, frame_interval: Duration) -> Self {
        let (targets, target_rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = watch::channel(animator.current());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            animator,
            frame_interval,
            target_rx,
            frame_tx,
            cancel.clone(),
        ));
        Self {
            targets,
            frames,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn retarget(&self, target: Rect) {
        if self.targets.send(target).is_err() {
            tracing::debug!("animation loop already stopped; target dropped");
        }
    }

    /// Latest animated rectangle.
    pub fn current(&self) -> Option<Rect> {
        *self.frames.borrow()
    }

    /// Receiver of animated rectangles.
    pub fn frames(&self) -> watch::Receiver<Option<Rect>> {
        self.frames.clone()
    }

    /// Cancel any pending tick and stop the task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "animation loop ended abnormally");
            }
        }
    }
}

impl Drop for AnimationLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    mut animator: ViewportAnimator,
    frame_interval: Duration,
    mut targets: mpsc::UnboundedReceiver<Rect>,
    frames: watch::Sender<Option<Rect>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = targets.recv() => {
                let Some(target) = received else {
                    break;
                };
                let first = animator.current().is_none();
                if animator.set_target(target) {
                    ticker.reset();
                }
                if first {
                    frames.send_replace(animator.current());
                }
            }
            _ = ticker.tick(), if animator.is_animating() => {
                match animator.tick() {
                    Tick::Moving(rect) | Tick::Settled(rect) => {
                        frames.send_replace(Some(rect));
                    }
                    Tick::Idle => {}
                }
            }
        }
    }

    animator.cancel();
    tracing::debug!("animation loop stopped");
}
