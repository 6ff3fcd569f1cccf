//! Real-time frame loop.
//!
//! Each tick pulls a frame, draws it on the shared canvas and hands it to the
//! processor on the runtime. Ticks that arrive while a frame is in flight are
//! dropped, never queued.

use crate::pipeline::{FrameProcessor, PipelineError, Rendered};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tryon_core::{FrameClock, Subject, Timestamp};
use tryon_hw::{CameraError, FrameSource};
use tryon_render::{Canvas, RenderError};

pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(33);

/// `tokio::time::interval` panics on a zero period.
const MIN_FRAME_BUDGET: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub enum TickOutcome {
    /// A previous frame is still being processed.
    Busy,
    /// Too soon after the last started frame.
    Throttled,
    Started(JoinHandle<Result<Rendered, PipelineError>>),
}

/// Summary of a finished frame, sent to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    Rendered(Rendered),
    NotDetected(Subject),
    Failed(String),
}

impl FrameStatus {
    fn of(result: &Result<Rendered, PipelineError>) -> Self {
        match result {
            Ok(rendered) => FrameStatus::Rendered(*rendered),
            Err(PipelineError::NotDetected(subject)) => FrameStatus::NotDetected(*subject),
            Err(err) => FrameStatus::Failed(err.to_string()),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, FrameStatus::Rendered(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvent {
    pub sequence: u32,
    pub timestamp: Timestamp,
    pub status: FrameStatus,
}

/// Clears the in-flight flag when the processing task ends, even on panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FrameDriver<S> {
    source: S,
    canvas: Arc<Mutex<Canvas>>,
    processor: Arc<dyn FrameProcessor>,
    in_flight: Arc<AtomicBool>,
    budget: Duration,
    last_started: Option<Instant>,
    clock: FrameClock,
    events: Option<mpsc::Sender<FrameEvent>>,
}

impl<S: FrameSource> FrameDriver<S> {
    pub fn new(source: S, processor: Arc<dyn FrameProcessor>) -> Self {
        let (width, height) = source.dimensions();
        Self {
            source,
            canvas: Arc::new(Mutex::new(Canvas::new(width, height))),
            processor,
            in_flight: Arc::new(AtomicBool::new(false)),
            budget: DEFAULT_FRAME_BUDGET,
            last_started: None,
            clock: FrameClock::new(),
            events: None,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget.max(MIN_FRAME_BUDGET);
        self
    }

    /// Receive a [`FrameEvent`] per finished frame. Events are dropped when
    /// the channel is full.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<FrameEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.events = Some(tx);
        rx
    }

    pub fn canvas(&self) -> Arc<Mutex<Canvas>> {
        Arc::clone(&self.canvas)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a frame if none is in flight and the budget has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, CameraError> {
        if self.is_busy() {
            return Ok(TickOutcome::Busy);
        }
        if let Some(last) = self.last_started {
            if now.saturating_duration_since(last) < self.budget {
                return Ok(TickOutcome::Throttled);
            }
        }
        let Ok(mut canvas) = self.canvas.clone().try_lock_owned() else {
            // Someone else (a capture) holds the canvas.
            return Ok(TickOutcome::Busy);
        };

        let frame = self.source.next_frame()?;
        let timestamp = self.clock.at(frame.timestamp);
        canvas.draw_frame(&frame.image);

        self.in_flight.store(true, Ordering::Release);
        self.last_started = Some(now);
        let guard = InFlight(Arc::clone(&self.in_flight));
        let processor = Arc::clone(&self.processor);
        let events = self.events.clone();
        let sequence = frame.sequence;
        let image = frame.image;

        let handle = tokio::spawn(async move {
            let result = processor
                .process_frame(&mut canvas, &image, timestamp)
                .await;
            drop(canvas);
            drop(guard);

            match &result {
                Ok(rendered) => tracing::trace!(sequence, ?rendered, "frame done"),
                Err(err) if err.is_not_detected() => {
                    tracing::debug!(sequence, reason = %err, "nothing detected")
                }
                Err(err) => tracing::warn!(sequence, error = %err, "frame processing failed"),
            }
            if let Some(tx) = events {
                let _ = tx.try_send(FrameEvent {
                    sequence,
                    timestamp,
                    status: FrameStatus::of(&result),
                });
            }
            result
        });
        Ok(TickOutcome::Started(handle))
    }

    /// Tick on the frame budget until `shutdown` turns true or its sender is
    /// dropped. A frame still in flight at shutdown finishes on its own.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.budget);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            modality = %self.processor.modality(),
            budget_ms = self.budget.as_millis() as u64,
            "frame driver started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick(Instant::now()) {
                        tracing::warn!(error = %err, "frame source failed; skipping tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("frame driver stopped");
    }

    /// Encode the current canvas as PNG.
    pub async fn capture_png(&self) -> Result<Vec<u8>, RenderError> {
        self.canvas.lock().await.encode_png()
    }
}
