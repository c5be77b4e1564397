//! Animation engine capability and its tokio implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dom::{Document, SharedDocument};
use crate::timeline::{Easing, Timeline};

/// Handle to a running animation.
///
/// Dropping the handle cancels the animation, so whoever holds it owns the
/// animation's lifetime.
#[derive(Debug)]
pub struct AnimationHandle {
    id: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AnimationHandle {
    pub fn new(id: u64, cancel: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self { id, cancel, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the animation. Values already written stay in place.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the animation is still running.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_none_or(|t| !t.is_finished())
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts animations. Both operations return immediately.
pub trait Animator: Send + Sync + 'static {
    /// Transition an element's opacity to `to` over `duration`.
    fn fade(&self, target_id: &str, to: f32, duration: Duration, easing: Easing) -> AnimationHandle;

    /// Play `timeline` on the first `count` descendants of `root_id`
    /// carrying `class`, letter `i` being the `i`-th such descendant.
    fn play(&self, root_id: &str, class: &str, count: usize, timeline: Timeline) -> AnimationHandle;
}

/// Drives animations with one tokio task each, writing into a shared document.
pub struct TokioAnimator<D> {
    document: SharedDocument<D>,
    frame: Duration,
    next_id: Arc<AtomicU64>,
}

impl<D> Clone for TokioAnimator<D> {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            frame: self.frame,
            next_id: self.next_id.clone(),
        }
    }
}

impl<D: Document> TokioAnimator<D> {
    pub fn new(document: SharedDocument<D>, frame: Duration) -> Self {
        Self {
            document,
            frame: frame.max(Duration::from_millis(1)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(self.frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

impl<D: Document> Animator for TokioAnimator<D> {
    fn fade(&self, target_id: &str, to: f32, duration: Duration, easing: Easing) -> AnimationHandle {
        let id = self.next_id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let document = self.document.clone();
        let target = target_id.to_string();
        let mut ticker = self.ticker();

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let Some(from) = document.lock().await.opacity(&target) else {
                debug!(target = %target, "Fade target missing");
                return;
            };
            trace!(id, target = %target, from, to, "Fade started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        trace!(id, "Fade cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let progress = if duration.is_zero() {
                            1.0
                        } else {
                            start.elapsed().as_secs_f64() / duration.as_secs_f64()
                        };
                        let value = if progress >= 1.0 {
                            to
                        } else {
                            from + (to - from) * easing.apply(progress) as f32
                        };

                        let mut doc = document.lock().await;
                        if token.is_cancelled() {
                            break;
                        }
                        if !doc.set_opacity(&target, value) || progress >= 1.0 {
                            break;
                        }
                    }
                }
            }
        });

        AnimationHandle::new(id, cancel, Some(task))
    }

    fn play(&self, root_id: &str, class: &str, count: usize, timeline: Timeline) -> AnimationHandle {
        let id = self.next_id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let document = self.document.clone();
        let root = root_id.to_string();
        let class = class.to_string();
        let mut ticker = self.ticker();

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let total = timeline.total(count);
            let mut offsets = Vec::with_capacity(count);
            trace!(id, root = %root, count, "Timeline started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        trace!(id, "Timeline cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let elapsed = start.elapsed();
                        offsets.clear();
                        offsets.extend((0..count).map(|index| timeline.sample(index, elapsed)));

                        let mut doc = document.lock().await;
                        if token.is_cancelled() {
                            break;
                        }
                        if !doc.set_offsets(&root, &class, &offsets) {
                            debug!(id, root = %root, "Timeline targets detached");
                            break;
                        }
                        if total.is_some_and(|total| elapsed >= total) {
                            break;
                        }
                    }
                }
            }
        });

        AnimationHandle::new(id, cancel, Some(task))
    }
}
