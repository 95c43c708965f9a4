//! Orchestrator loop — ties the schedule, camera, recognizer, reconciler,
//! and writer together on a single sequential control loop.
//!
//! One frame is processed end-to-end per tick; no per-frame locking of the
//! gallery or debounce set is ever needed. Every per-tick failure is
//! absorbed into a log line and a delay — the loop never terminates the
//! process on a transient camera, store, or recognition error.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;

use rollcall_core::{EuclideanMatcher, FaceEngine, Gallery, Recognizer};
use rollcall_hw::FrameSource;
use rollcall_store::{writer, Applied, ClassWindow, Store, StoreError};

use crate::reconciler::Reconciler;

/// Loop phase. `Recovering` means a class is active but the camera is down
/// and will be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Recovering,
}

/// Tick cadence and bounds.
pub struct Timing {
    pub tick_interval: Duration,
    pub idle_poll: Duration,
    pub retry_delay: Duration,
    pub store_timeout: Duration,
}

pub struct Orchestrator<E> {
    store: Store,
    gallery: Gallery,
    engine: E,
    recognizer: Recognizer<EuclideanMatcher>,
    source: FrameSource,
    reconciler: Reconciler,
    timing: Timing,
    phase: Phase,
    current: Option<ClassWindow>,
}

impl<E: FaceEngine> Orchestrator<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        gallery: Gallery,
        engine: E,
        matcher: EuclideanMatcher,
        source: FrameSource,
        cooldown: Duration,
        timing: Timing,
    ) -> Self {
        Self {
            store,
            gallery,
            engine,
            recognizer: Recognizer::new(matcher),
            source,
            reconciler: Reconciler::new(cooldown),
            timing,
            phase: Phase::Idle,
            current: None,
        }
    }

    /// Drive ticks until cancelled. The camera is released on every exit
    /// path.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    delay = self.tick().await;
                }
            }
        }
        self.source.close();
        tracing::info!("orchestrator stopped");
    }

    /// One scheduling tick. Returns the delay until the next tick.
    pub(crate) async fn tick(&mut self) -> Duration {
        let now = Local::now();
        let window = match bounded(
            self.timing.store_timeout,
            self.store.active_class_window(now.date_naive(), now.time()),
        )
        .await
        {
            Ok(window) => window,
            Err(err) => {
                tracing::error!(error = %err, "schedule lookup failed");
                return self.timing.retry_delay;
            }
        };

        let Some(window) = window else {
            self.enter_idle().await;
            return self.timing.idle_poll;
        };

        if self.current.as_ref().map(|w| w.id) != Some(window.id) {
            tracing::info!(class = %window.name, id = window.id, "class started");
            self.audit(&format!("class started: {}", window.name)).await;
            self.current = Some(window.clone());
        }

        if !self.source.is_open() {
            match self.source.open() {
                Ok(()) => {
                    if self.phase == Phase::Recovering {
                        tracing::info!("camera recovered");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "camera open failed; will retry");
                    self.phase = Phase::Recovering;
                    return self.timing.retry_delay;
                }
            }
        }
        self.phase = Phase::Active;

        let frame = match tokio::task::block_in_place(|| self.source.read()) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame read failed; closing camera for retry");
                self.source.close();
                self.phase = Phase::Recovering;
                return self.timing.retry_delay;
            }
        };

        let observations = match tokio::task::block_in_place(|| {
            self.engine.extract(&frame.data, frame.width, frame.height)
        }) {
            Ok(observations) => observations,
            Err(err) => {
                tracing::warn!(error = %err, "face engine failed for this frame");
                return self.timing.tick_interval;
            }
        };

        let detections = self.recognizer.detect(&observations, &self.gallery);
        for detection in &detections {
            if let Some(identity) = &detection.identity {
                tracing::debug!(
                    student = %identity.student_id,
                    confidence = detection.confidence,
                    "recognized"
                );
            }
        }

        let intents = self
            .reconciler
            .reconcile(&window, &detections, Instant::now(), Utc::now());
        for intent in &intents {
            match bounded(self.timing.store_timeout, writer::apply(&self.store, intent)).await {
                Ok(Applied::Inserted) => tracing::info!(
                    student = %intent.student_id,
                    class = intent.class_id,
                    "attendance recorded"
                ),
                Ok(Applied::Updated) => tracing::info!(
                    student = %intent.student_id,
                    class = intent.class_id,
                    "attendance refreshed"
                ),
                Err(err) => tracing::error!(
                    student = %intent.student_id,
                    error = %err,
                    "attendance write failed"
                ),
            }
        }

        self.timing.tick_interval
    }

    async fn enter_idle(&mut self) {
        if self.phase == Phase::Idle && self.current.is_none() {
            return;
        }
        self.source.close();
        self.reconciler.clear();
        if let Some(window) = self.current.take() {
            tracing::info!(class = %window.name, "class ended; camera shut down");
            self.audit("camera shut down - no active class").await;
        }
        self.phase = Phase::Idle;
    }

    async fn audit(&self, line: &str) {
        if let Err(err) = bounded(
            self.timing.store_timeout,
            self.store.append_activity_log(line),
        )
        .await
        {
            tracing::warn!(error = %err, "activity log append failed");
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}
