//! In-memory collaborators
//!
//! Every mock counts its calls so tests can assert on side effects. Delays
//! use `tokio::time::sleep`, so they cooperate with a paused test clock.

use async_trait::async_trait;
use image::RgbImage;
use physio_coach::audio::{ActivePlayback, AudioClip, AudioSink, PlaybackHandle};
use physio_coach::capture::{CaptureFrame, FrameSource};
use physio_coach::error::{Error, Result};
use physio_coach::services::{PoseResult, PoseService, ProgressStore, SpeechSynthesizer};
use physio_coach::session::ExerciseDefinition;
use physio_common::api::{RepAction, RepCountsResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use super::fixtures::{analysis, wav_bytes};

// ============================================================================
// Pose service
// ============================================================================

/// Decrements the outstanding count even if the call is cancelled
struct Outstanding<'a>(&'a AtomicUsize);

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockPoseService {
    delay: Duration,
    reset_delay: Duration,
    queued: Mutex<VecDeque<PoseResult>>,
    default_result: Mutex<PoseResult>,
    submit_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    last_frame: Mutex<Option<Vec<u8>>>,
}

impl MockPoseService {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            reset_delay: Duration::ZERO,
            queued: Mutex::new(VecDeque::new()),
            default_result: Mutex::new(analysis(0, "")),
            submit_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            last_frame: Mutex::new(None),
        }
    }

    /// Every submission takes `delay` to resolve
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `reset_session` takes `delay` to land on the server
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// Result for the next submission (FIFO); falls back to the default
    pub fn push_result(&self, result: PoseResult) {
        self.queued.lock().unwrap().push_back(result);
    }

    /// Stands in for the server's accumulated count until the next reset
    pub fn set_default_result(&self, result: PoseResult) {
        *self.default_result.lock().unwrap() = result;
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    /// Highest number of submissions ever outstanding at once
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.last_frame.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoseService for MockPoseService {
    async fn submit_frame(&self, jpeg: Vec<u8>) -> PoseResult {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
        let _outstanding = Outstanding(&self.outstanding);

        *self.last_frame.lock().unwrap() = Some(jpeg);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.default_result.lock().unwrap().clone())
    }

    async fn reset_session(&self) -> PoseResult {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reset_delay.is_zero() {
            tokio::time::sleep(self.reset_delay).await;
        }
        *self.default_result.lock().unwrap() = analysis(0, "");
        analysis(0, "")
    }
}

// ============================================================================
// Progress store
// ============================================================================

pub struct MockProgressStore {
    /// None makes `fetch_reps` fail
    counts: Mutex<Option<RepCountsResponse>>,
    actions: Mutex<Vec<RepAction>>,
    complete_calls: AtomicUsize,
    fail_complete: AtomicBool,
    exercises: Mutex<Vec<ExerciseDefinition>>,
}

impl MockProgressStore {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(None),
            actions: Mutex::new(Vec::new()),
            complete_calls: AtomicUsize::new(0),
            fail_complete: AtomicBool::new(false),
            exercises: Mutex::new(Vec::new()),
        }
    }

    pub fn with_counts(self, counts: RepCountsResponse) -> Self {
        *self.counts.lock().unwrap() = Some(counts);
        self
    }

    pub fn failing_completion(self) -> Self {
        self.fail_complete.store(true, Ordering::SeqCst);
        self
    }

    pub fn actions(&self) -> Vec<RepAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressStore for MockProgressStore {
    async fn fetch_reps(&self, _patient_id: u32, _exercise_id: u32) -> Result<RepCountsResponse> {
        self.counts.lock().unwrap().clone().ok_or(Error::Api {
            status: 500,
            message: "Database error".to_string(),
        })
    }

    async fn post_rep_action(
        &self,
        _patient_id: u32,
        _exercise_id: u32,
        action: RepAction,
    ) -> Result<()> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }

    async fn confirm_complete(&self, _patient_id: u32, _exercise_id: u32) -> Result<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(Error::Http("connection refused".to_string()));
        }
        Ok(())
    }

    async fn todays_exercises(&self, _patient_id: u32) -> Result<Vec<ExerciseDefinition>> {
        Ok(self.exercises.lock().unwrap().clone())
    }
}

// ============================================================================
// Speech synthesis
// ============================================================================

pub struct MockSynth {
    delay: Duration,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockSynth {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynth {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 500,
                message: "TTS failed".to_string(),
            });
        }
        Ok(wav_bytes(100))
    }
}

// ============================================================================
// Audio output
// ============================================================================

struct MockPlayback {
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for MockPlayback {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Records started playbacks; completion is triggered by the test
pub struct MockAudioSink {
    fail: AtomicBool,
    stopped: Mutex<Vec<Arc<AtomicBool>>>,
    finishers: Mutex<Vec<Option<oneshot::Sender<()>>>>,
    clips: Mutex<Vec<AudioClip>>,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            stopped: Mutex::new(Vec::new()),
            finishers: Mutex::new(Vec::new()),
            clips: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn play_count(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }

    /// Whether playback `index` (0-based, in start order) was stopped
    pub fn was_stopped(&self, index: usize) -> bool {
        self.stopped.lock().unwrap()[index].load(Ordering::SeqCst)
    }

    /// Signal that playback `index` played to the end
    pub fn finish(&self, index: usize) {
        if let Some(tx) = self.finishers.lock().unwrap()[index].take() {
            let _ = tx.send(());
        }
    }

    pub fn clip(&self, index: usize) -> AudioClip {
        self.clips.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl AudioSink for MockAudioSink {
    async fn start(&self, clip: AudioClip) -> Result<ActivePlayback> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("No default output device found".to_string()));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        self.stopped.lock().unwrap().push(Arc::clone(&stopped));
        self.finishers.lock().unwrap().push(Some(tx));
        self.clips.lock().unwrap().push(clip);

        Ok(ActivePlayback {
            handle: Box::new(MockPlayback { stopped }),
            finished: rx,
        })
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Produces a flat grey frame on every capture
pub struct StaticFrameSource {
    delay: Duration,
    fail: AtomicBool,
    captures: AtomicUsize,
}

impl StaticFrameSource {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
        }
    }

    /// Every capture takes `delay`, like a stalled camera
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn capture(&self) -> Result<CaptureFrame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Capture("Camera unavailable".to_string()));
        }
        Ok(CaptureFrame::new(RgbImage::from_pixel(
            16,
            16,
            image::Rgb([120, 120, 120]),
        )))
    }
}
