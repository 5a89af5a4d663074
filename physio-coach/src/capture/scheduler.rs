//! Periodic capture loop
//!
//! Every `interval` the scheduler captures one frame, compresses it and
//! submits it to the pose service, then routes the result to the session
//! and the narrator.
//!
//! **Skip-if-busy:** at most one submission is outstanding. A tick that
//! finds the previous one unresolved is dropped, never queued. The gate is
//! held from frame capture until the result has been applied, so results
//! apply in issue order.
//! Capture and compression are bounded by the request timeout, so a stalled
//! camera cannot hold the gate.
//!
//! Stopping cancels the timer only. A submission already in flight runs to
//! completion; its result is discarded by the session if the originating
//! session is gone.

use crate::audio::NarratorAudioChannel;
use crate::capture::{CompressedFrame, FrameSource};
use crate::config::CaptureSettings;
use crate::error::{Error, Result};
use crate::services::{PoseResult, PoseService};
use crate::session::ExerciseSession;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was sent to the pose service
    Submitted { request_id: u64 },
    /// Previous submission still outstanding
    SkippedBusy,
    /// Pose-session reset still on its way to the server
    SkippedResetting,
    /// Session not capturing
    Inactive,
    /// Frame acquisition or compression failed
    CaptureFailed,
}

/// Clears the in-flight flag when the submission is done with it
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fixed-interval capture driver for one exercise session
pub struct CaptureScheduler {
    session: Arc<ExerciseSession>,
    pose: Arc<dyn PoseService>,
    frames: Arc<dyn FrameSource>,
    narrator: Option<Arc<NarratorAudioChannel>>,
    settings: CaptureSettings,
    in_flight: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    cancel: CancellationToken,
}

impl CaptureScheduler {
    pub fn new(
        session: Arc<ExerciseSession>,
        pose: Arc<dyn PoseService>,
        frames: Arc<dyn FrameSource>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            session,
            pose,
            frames,
            narrator: None,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            next_request_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Speak feedback from applied results on `narrator`
    pub fn with_narrator(mut self, narrator: Arc<NarratorAudioChannel>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    /// Run one capture tick
    pub async fn tick(&self) -> TickOutcome {
        let Some(origin) = self.session.current_origin().await else {
            if self.session.is_capturing().await {
                debug!("Pose session reset pending, skipping tick");
                return TickOutcome::SkippedResetting;
            }
            return TickOutcome::Inactive;
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous pose submission outstanding, skipping tick");
            return TickOutcome::SkippedBusy;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let request_timeout = self.settings.request_timeout;
        let compressed = match timeout(request_timeout, self.capture_compressed()).await {
            Ok(Ok(compressed)) => compressed,
            Ok(Err(e)) => {
                warn!("Frame capture failed: {}", e);
                return TickOutcome::CaptureFailed;
            }
            Err(_) => {
                warn!(
                    timeout_ms = request_timeout.as_millis() as u64,
                    "Frame capture timed out"
                );
                return TickOutcome::CaptureFailed;
            }
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id,
            bytes = compressed.jpeg.len(),
            width = compressed.width,
            height = compressed.height,
            "Submitting frame"
        );

        let session = Arc::clone(&self.session);
        let pose = Arc::clone(&self.pose);
        let narrator = self.narrator.clone();

        tokio::spawn(async move {
            let result = match timeout(request_timeout, pose.submit_frame(compressed.jpeg)).await
            {
                Ok(result) => result,
                Err(_) => PoseResult::Error(format!(
                    "Pose request timed out after {} ms",
                    request_timeout.as_millis()
                )),
            };

            let applied = session.apply_pose_result(origin, request_id, &result).await;
            drop(guard);

            if !applied {
                return;
            }
            if let (Some(narrator), Some(text)) = (narrator, result.spoken_feedback()) {
                let text = text.to_string();
                // Own task: synthesis latency must not hold the capture gate
                tokio::spawn(async move {
                    let outcome = narrator.speak(&text).await;
                    debug!(request_id, ?outcome, "Feedback dispatched");
                });
            }
        });

        TickOutcome::Submitted { request_id }
    }

    async fn capture_compressed(&self) -> Result<CompressedFrame> {
        let frame = self.frames.capture().await?;
        let quality = self.settings.jpeg_quality;
        tokio::task::spawn_blocking(move || frame.compress(quality))
            .await
            .map_err(|e| Error::Capture(format!("Compression task failed: {}", e)))?
    }

    /// Tick every `interval` until stopped or the session stops capturing
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            "Capture loop started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Capture loop cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if self.tick().await == TickOutcome::Inactive {
                info!("Session no longer capturing, capture loop exiting");
                break;
            }
        }
    }

    /// Spawn [`run`](Self::run) on the runtime
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Cancel the timer; in-flight submissions are left to finish
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether a submission is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
