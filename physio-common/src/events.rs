//! Event types for the PhysioCoach event system
//!
//! Provides the shared session enums, the `CoachEvent` enum and the
//! broadcast `EventBus` that carries it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Inferred phase of a single repetition, as reported by the pose service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// No stage reported yet, or reset
    #[default]
    Unknown,
    /// Contracted position (e.g. knee bent)
    Down,
    /// Extended position
    Up,
}

impl Stage {
    /// Parse the pose service's free-text stage ("down", "UP", ...)
    ///
    /// Anything unrecognised maps to `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "down" => Stage::Down,
            "up" => Stage::Up,
            _ => Stage::Unknown,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Unknown => write!(f, "unknown"),
            Stage::Down => write!(f, "down"),
            Stage::Up => write!(f, "up"),
        }
    }
}

/// Exercise session phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum SessionPhase {
    /// No exercise running
    #[default]
    Idle,
    /// Exercise running, capture enabled
    Active,
    /// Between two sets; published only as a transition event
    SetComplete,
    /// All sets done (terminal until stopped)
    ExerciseComplete,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::Active => write!(f, "Active"),
            SessionPhase::SetComplete => write!(f, "SetComplete"),
            SessionPhase::ExerciseComplete => write!(f, "ExerciseComplete"),
        }
    }
}

/// PhysioCoach event types
///
/// Events are broadcast via EventBus. The CLI prints them; tests subscribe
/// to observe transitions without reaching into session internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoachEvent {
    /// Exercise session started
    SessionStarted {
        session_id: Uuid,
        exercise_id: u32,
        exercise_name: String,
        current_set: u32,
        target_sets: u32,
        current_reps: u32,
        target_reps: u32,
        timestamp: DateTime<Utc>,
    },

    /// Pose service returned an analysis that was applied to the session
    PoseAnalyzed {
        session_id: Uuid,
        request_id: u64,
        reported_reps: u32,
        stage: Stage,
        knee_angle: Option<f64>,
        hip_angle: Option<f64>,
    },

    /// Pose submission failed (network, timeout or service-reported error)
    PoseFailed {
        session_id: Uuid,
        request_id: u64,
        message: String,
    },

    /// Local rep count changed
    RepsChanged {
        session_id: Uuid,
        current_set: u32,
        current_reps: u32,
        target_reps: u32,
    },

    /// Session phase changed
    PhaseChanged {
        session_id: Uuid,
        old_phase: SessionPhase,
        new_phase: SessionPhase,
        timestamp: DateTime<Utc>,
    },

    /// A set was completed and the next one began
    SetCompleted {
        session_id: Uuid,
        completed_set: u32,
        next_set: u32,
    },

    /// Final set completed
    ExerciseCompleted {
        session_id: Uuid,
        exercise_id: u32,
        /// Whether the backend confirmed the completion
        persisted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Progress was explicitly reset
    ProgressReset { session_id: Uuid, current_set: u32 },

    /// Feedback text started playing on the narrator channel
    FeedbackSpoken {
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Session stopped (user stop or shutdown)
    SessionStopped {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl CoachEvent {
    /// Event type name, for logging
    pub fn event_type(&self) -> &str {
        match self {
            CoachEvent::SessionStarted { .. } => "SessionStarted",
            CoachEvent::PoseAnalyzed { .. } => "PoseAnalyzed",
            CoachEvent::PoseFailed { .. } => "PoseFailed",
            CoachEvent::RepsChanged { .. } => "RepsChanged",
            CoachEvent::PhaseChanged { .. } => "PhaseChanged",
            CoachEvent::SetCompleted { .. } => "SetCompleted",
            CoachEvent::ExerciseCompleted { .. } => "ExerciseCompleted",
            CoachEvent::ProgressReset { .. } => "ProgressReset",
            CoachEvent::FeedbackSpoken { .. } => "FeedbackSpoken",
            CoachEvent::SessionStopped { .. } => "SessionStopped",
        }
    }
}

/// Broadcast bus for [`CoachEvent`]
///
/// Thin wrapper around `tokio::sync::broadcast`. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
pub struct EventBus {
    tx: broadcast::Sender<CoachEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use physio_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CoachEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(
        &self,
        event: CoachEvent,
    ) -> Result<usize, broadcast::error::SendError<CoachEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CoachEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
