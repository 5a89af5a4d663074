//! Exercise session state machine
//!
//! `Idle → Active(set 1) → … → Active(set n) → ExerciseComplete`
//!
//! This type is pure bookkeeping: it performs no I/O and never blocks. The
//! orchestrator ([`super::ExerciseSession`]) owns it and performs the
//! network side effects around each transition.

use crate::error::{Error, Result};
use crate::services::PoseResult;
use crate::session::ExerciseDefinition;
use physio_common::events::{SessionPhase, Stage};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Local rep counter for the current set
///
/// Invariant: `current <= target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepCounter {
    current: u32,
    target: u32,
}

impl RepCounter {
    /// Create a counter; `current` is clamped to `target`
    pub fn new(current: u32, target: u32) -> Self {
        Self {
            current: current.min(target),
            target,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Adopt `max(local, reported)`, clamped to target
    ///
    /// Returns true if the count changed.
    pub fn merge_reported(&mut self, reported: u32) -> bool {
        let merged = self.current.max(reported.min(self.target));
        let changed = merged != self.current;
        self.current = merged;
        changed
    }

    /// Add one rep unless the target is already reached
    pub fn increment(&mut self) -> bool {
        if self.current < self.target {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn is_target_reached(&self) -> bool {
        self.current >= self.target
    }
}

/// Result of applying a pose result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Session not active; nothing changed
    Ignored,
    Applied { reps_changed: bool },
}

/// Result of a successful `request_complete_set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCompletion {
    /// Another set follows; reps were zeroed
    NextSet { completed_set: u32, next_set: u32 },
    /// Final set done; capture stopped
    ExerciseComplete { completed_set: u32 },
}

/// Serializable view of the session, for status output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub exercise_id: Option<u32>,
    pub exercise_name: Option<String>,
    pub phase: SessionPhase,
    pub current_set: u32,
    pub target_sets: u32,
    pub current_reps: u32,
    pub target_reps: u32,
    pub stage: Stage,
    pub capturing: bool,
}

/// Set/rep state of one exercise session
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: Option<Uuid>,
    exercise: Option<ExerciseDefinition>,
    current_set: u32,
    reps: RepCounter,
    stage: Stage,
    phase: SessionPhase,
    capturing: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: None,
            exercise: None,
            current_set: 1,
            reps: RepCounter::new(0, 0),
            stage: Stage::Unknown,
            phase: SessionPhase::Idle,
            capturing: false,
        }
    }

    /// Idle → Active
    ///
    /// `current_set` is clamped into `1..=target_sets`; `reps` is the
    /// already-merged starting counter. Returns the new session id.
    pub fn start(
        &mut self,
        exercise: ExerciseDefinition,
        current_set: u32,
        reps: RepCounter,
    ) -> Result<Uuid> {
        match self.phase {
            SessionPhase::Idle => {}
            SessionPhase::ExerciseComplete => {
                return Err(Error::InvalidState(
                    "Exercise already complete; stop the session before starting again"
                        .to_string(),
                ));
            }
            phase => {
                return Err(Error::InvalidState(format!(
                    "Cannot start a session while {}",
                    phase
                )));
            }
        }

        let session_id = Uuid::new_v4();
        self.current_set = current_set.clamp(1, exercise.target_sets);
        self.reps = RepCounter::new(reps.current(), exercise.target_reps);
        self.exercise = Some(exercise);
        self.session_id = Some(session_id);
        self.stage = Stage::Unknown;
        self.phase = SessionPhase::Active;
        self.capturing = true;

        debug!(%session_id, set = self.current_set, reps = self.reps.current(), "Session started");
        Ok(session_id)
    }

    /// Merge a pose result into the current set
    ///
    /// Only valid while Active; otherwise a no-op. Never changes phase.
    pub fn apply_pose_result(&mut self, result: &PoseResult) -> ApplyOutcome {
        if self.phase != SessionPhase::Active {
            return ApplyOutcome::Ignored;
        }

        match result {
            PoseResult::Analysis(analysis) => {
                self.stage = analysis.stage;
                ApplyOutcome::Applied {
                    reps_changed: self.reps.merge_reported(analysis.reps),
                }
            }
            PoseResult::Error(_) => ApplyOutcome::Applied {
                reps_changed: false,
            },
        }
    }

    /// Manual +1, clamped at target
    pub fn increment_rep(&mut self) -> Result<bool> {
        self.require_active("increment reps")?;
        Ok(self.reps.increment())
    }

    /// Complete the current set
    ///
    /// Requires `current_reps >= target_reps`.
    pub fn request_complete_set(&mut self) -> Result<SetCompletion> {
        self.require_active("complete a set")?;

        if !self.reps.is_target_reached() {
            return Err(Error::Precondition(format!(
                "Set {} has {} of {} reps",
                self.current_set,
                self.reps.current(),
                self.reps.target()
            )));
        }

        let completed_set = self.current_set;
        if completed_set < self.target_sets() {
            self.current_set += 1;
            self.reps.reset();
            self.stage = Stage::Unknown;
            Ok(SetCompletion::NextSet {
                completed_set,
                next_set: self.current_set,
            })
        } else {
            self.phase = SessionPhase::ExerciseComplete;
            self.capturing = false;
            Ok(SetCompletion::ExerciseComplete { completed_set })
        }
    }

    /// Zero reps in the current set
    pub fn reset_progress(&mut self) -> Result<()> {
        self.require_active("reset progress")?;
        self.reps.reset();
        self.stage = Stage::Unknown;
        Ok(())
    }

    /// Any phase → Idle
    ///
    /// Returns the id of the session that was running, if any.
    pub fn stop(&mut self) -> Option<Uuid> {
        let previous = self.session_id.take();
        self.exercise = None;
        self.current_set = 1;
        self.reps = RepCounter::new(0, 0);
        self.stage = Stage::Unknown;
        self.phase = SessionPhase::Idle;
        self.capturing = false;
        previous
    }

    fn require_active(&self, action: &str) -> Result<()> {
        if self.phase == SessionPhase::Active {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Cannot {} while {}",
                action, self.phase
            )))
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn exercise(&self) -> Option<&ExerciseDefinition> {
        self.exercise.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn current_set(&self) -> u32 {
        self.current_set
    }

    pub fn target_sets(&self) -> u32 {
        self.exercise.as_ref().map_or(0, |e| e.target_sets)
    }

    pub fn current_reps(&self) -> u32 {
        self.reps.current()
    }

    pub fn target_reps(&self) -> u32 {
        self.reps.target()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            exercise_id: self.exercise.as_ref().map(|e| e.id),
            exercise_name: self.exercise.as_ref().map(|e| e.name.clone()),
            phase: self.phase,
            current_set: self.current_set,
            target_sets: self.target_sets(),
            current_reps: self.reps.current(),
            target_reps: self.reps.target(),
            stage: self.stage,
            capturing: self.capturing,
        }
    }
}
