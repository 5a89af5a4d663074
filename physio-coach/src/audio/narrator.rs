//! Spoken feedback channel
//!
//! Owns at most one live playback. `speak` is rate limited: a request that
//! arrives within `min_interval` of the last successful playback start is
//! dropped, as is one that arrives while a previous request is still being
//! synthesized. Nothing is queued.
//!
//! Failures never leave this module; they are logged and reported through
//! [`SpeakOutcome`].

use crate::audio::{decode_clip, ActivePlayback, AudioSink, PlaybackHandle};
use crate::config::NarrationSettings;
use crate::error::{Error, Result};
use crate::services::SpeechSynthesizer;
use chrono::Utc;
use physio_common::events::{CoachEvent, EventBus};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a `speak` request did not produce audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Text was empty or whitespace
    Empty,
    /// Narration disabled by configuration
    Disabled,
    /// Inside the minimum interval since the last playback start
    Throttled,
    /// Another request is still being synthesized
    Busy,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty text"),
            SkipReason::Disabled => write!(f, "narration disabled"),
            SkipReason::Throttled => write!(f, "throttled"),
            SkipReason::Busy => write!(f, "synthesis in progress"),
        }
    }
}

/// Result of a `speak` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Played,
    Skipped(SkipReason),
    Failed(String),
}

impl SpeakOutcome {
    pub fn is_played(&self) -> bool {
        matches!(self, SpeakOutcome::Played)
    }
}

struct LivePlayback {
    id: u64,
    handle: Box<dyn PlaybackHandle>,
}

#[derive(Default)]
struct ChannelState {
    last_playback_start: Option<Instant>,
    active: Option<LivePlayback>,
}

/// Clears the synthesis flag when a request finishes, however it finishes
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single shared audio feedback channel
pub struct NarratorAudioChannel {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    settings: NarrationSettings,
    /// Never held across an await
    state: Arc<Mutex<ChannelState>>,
    synthesizing: AtomicBool,
    next_playback_id: AtomicU64,
    events: Option<Arc<EventBus>>,
}

impl NarratorAudioChannel {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        settings: NarrationSettings,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            settings,
            state: Arc::new(Mutex::new(ChannelState::default())),
            synthesizing: AtomicBool::new(false),
            next_playback_id: AtomicU64::new(1),
            events: None,
        }
    }

    /// Publish `FeedbackSpoken` on this bus for every started playback
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Speak `text` unless the channel is throttled or busy
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeakOutcome::Skipped(SkipReason::Empty);
        }
        if !self.settings.enabled {
            return SpeakOutcome::Skipped(SkipReason::Disabled);
        }

        let requested_at = Instant::now();
        if self.is_throttled(requested_at) {
            debug!(text, "Feedback dropped by rate limit");
            return SpeakOutcome::Skipped(SkipReason::Throttled);
        }

        if self
            .synthesizing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(text, "Feedback dropped, synthesis already in progress");
            return SpeakOutcome::Skipped(SkipReason::Busy);
        }
        let _busy = BusyGuard(&self.synthesizing);

        match self.play(text, requested_at).await {
            Ok(()) => SpeakOutcome::Played,
            Err(e) => {
                warn!(text, "Spoken feedback failed: {}", e);
                SpeakOutcome::Failed(e.to_string())
            }
        }
    }

    async fn play(&self, text: &str, requested_at: Instant) -> Result<()> {
        let encoded = self.synthesizer.synthesize(text).await?;
        let clip = tokio::task::spawn_blocking(move || decode_clip(encoded))
            .await
            .map_err(|e| Error::Internal(format!("Decode task failed: {}", e)))??;

        let previous = self.lock_state().active.take();
        if let Some(mut previous) = previous {
            debug!(playback_id = previous.id, "Tearing down previous playback");
            previous.handle.stop();
        }

        let ActivePlayback { handle, finished } = self.sink.start(clip).await?;
        let id = self.next_playback_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.lock_state();
            if let Some(mut stale) = state.active.replace(LivePlayback { id, handle }) {
                stale.handle.stop();
            }
            state.last_playback_start = Some(requested_at);
        }

        // Release the handle once playback ends, unless a newer one replaced it
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let _ = finished.await;
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if state.active.as_ref().is_some_and(|p| p.id == id) {
                state.active = None;
                debug!(playback_id = id, "Playback released");
            }
        });

        info!(playback_id = id, text, "Speaking feedback");
        if let Some(events) = &self.events {
            events.emit_lossy(CoachEvent::FeedbackSpoken {
                text: text.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    fn is_throttled(&self, now: Instant) -> bool {
        self.lock_state()
            .last_playback_start
            .is_some_and(|last| now.duration_since(last) < self.settings.min_interval)
    }

    /// Whether a playback resource is currently held
    pub fn is_playing(&self) -> bool {
        self.lock_state().active.is_some()
    }

    pub fn last_playback_start(&self) -> Option<Instant> {
        self.lock_state().last_playback_start
    }

    /// Stop and release any live playback
    pub fn shutdown(&self) {
        let active = self.lock_state().active.take();
        if let Some(mut active) = active {
            active.handle.stop();
            debug!(playback_id = active.id, "Playback stopped on shutdown");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
