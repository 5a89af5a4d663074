//! Exercise session orchestration
//!
//! [`ExerciseSession`] is the only writer of [`SessionState`]. It performs
//! the network side effects around each transition (pose-session resets,
//! rep counter pushes, completion confirmation) and publishes
//! [`CoachEvent`]s. The state lock is never held across a network await.
//!
//! **Stale results:** every pose submission is tagged with a
//! [`SubmissionOrigin`] (session id plus reset epoch). A result is applied
//! only if its origin still matches: a stopped or restarted session, or a
//! local reset since the frame was sent, discards it. While a pose-session
//! reset is on its way to the server no origin is handed out, since the
//! server would answer with its pre-reset count.

use crate::error::{Error, Result};
use crate::services::{PoseResult, PoseService, ProgressStore};
use crate::session::{
    ApplyOutcome, ExerciseDefinition, RepCounterSync, SessionSnapshot, SessionState,
    SetCompletion,
};
use chrono::Utc;
use physio_common::events::{CoachEvent, EventBus, SessionPhase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies the session state a pose submission was issued against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionOrigin {
    pub session_id: Uuid,
    pub epoch: u64,
}

/// Result of a successful set completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    NextSet {
        completed_set: u32,
        next_set: u32,
    },
    ExerciseComplete {
        completed_set: u32,
        /// Backend confirmed the completion; local state completes either way
        persisted: bool,
    },
}

struct Inner {
    state: SessionState,
    sync: Option<RepCounterSync>,
    /// Pose-session resets issued but not yet answered
    pending_resets: u32,
    /// A start is awaiting the backend; cleared by `stop`
    starting: bool,
    start_generation: u64,
}

impl Inner {
    /// Bump the epoch and hold off new submissions until the pose reset lands
    fn begin_pose_reset(&mut self, epoch: &AtomicU64) {
        self.pending_resets += 1;
        epoch.fetch_add(1, Ordering::AcqRel);
    }
}

/// Owner of the session state machine
pub struct ExerciseSession {
    inner: RwLock<Inner>,
    pose: Arc<dyn PoseService>,
    store: Arc<dyn ProgressStore>,
    events: Arc<EventBus>,
    patient_id: u32,
    /// Bumped on every start, and on both ends of each local reset
    reset_epoch: AtomicU64,
}

impl ExerciseSession {
    pub fn new(
        pose: Arc<dyn PoseService>,
        store: Arc<dyn ProgressStore>,
        events: Arc<EventBus>,
        patient_id: u32,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::new(),
                sync: None,
                pending_resets: 0,
                starting: false,
                start_generation: 0,
            }),
            pose,
            store,
            events,
            patient_id,
            reset_epoch: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Start `exercise`
    ///
    /// Fetches the backend counter (falling back to zero) and resets the
    /// pose service's accumulation before entering Active. A `stop` issued
    /// while those calls are pending cancels the start with
    /// `Error::InvalidState`.
    pub async fn start(&self, exercise: ExerciseDefinition) -> Result<Uuid> {
        let generation = {
            let mut inner = self.inner.write().await;
            if inner.starting {
                return Err(Error::InvalidState(format!(
                    "Cannot start '{}' while another start is in progress",
                    exercise.name
                )));
            }
            match inner.state.phase() {
                SessionPhase::Idle => {}
                phase => {
                    return Err(Error::InvalidState(format!(
                        "Cannot start '{}' while {}",
                        exercise.name, phase
                    )));
                }
            }
            inner.starting = true;
            inner.start_generation += 1;
            inner.start_generation
        };

        let sync = RepCounterSync::new(Arc::clone(&self.store), self.patient_id, exercise.id);
        let initial = sync.fetch_initial(&exercise).await;

        if let PoseResult::Error(message) = self.pose.reset_session().await {
            warn!("Pose session reset failed at start: {}", message);
        }

        let mut inner = self.inner.write().await;
        if !inner.starting || inner.start_generation != generation {
            info!(exercise_id = exercise.id, "Start cancelled by stop");
            return Err(Error::InvalidState(format!(
                "Start of '{}' was cancelled by stop",
                exercise.name
            )));
        }
        inner.starting = false;
        let session_id = inner
            .state
            .start(exercise.clone(), initial.current_set, initial.counter)?;
        inner.sync = Some(sync);
        self.reset_epoch.fetch_add(1, Ordering::AcqRel);

        info!(
            %session_id,
            exercise_id = exercise.id,
            exercise = %exercise.name,
            set = inner.state.current_set(),
            reps = inner.state.current_reps(),
            "Exercise session started"
        );

        self.events.emit_lossy(CoachEvent::SessionStarted {
            session_id,
            exercise_id: exercise.id,
            exercise_name: exercise.name.clone(),
            current_set: inner.state.current_set(),
            target_sets: inner.state.target_sets(),
            current_reps: inner.state.current_reps(),
            target_reps: inner.state.target_reps(),
            timestamp: Utc::now(),
        });
        self.emit_phase(session_id, SessionPhase::Idle, SessionPhase::Active);

        Ok(session_id)
    }

    /// Origin tag for a submission issued now
    ///
    /// None unless Active, and None while a pose-session reset is pending.
    pub async fn current_origin(&self) -> Option<SubmissionOrigin> {
        let inner = self.inner.read().await;
        if inner.state.phase() != SessionPhase::Active || inner.pending_resets > 0 {
            return None;
        }
        inner.state.session_id().map(|session_id| SubmissionOrigin {
            session_id,
            epoch: self.reset_epoch.load(Ordering::Acquire),
        })
    }

    /// Apply a pose result issued from `origin`
    ///
    /// Returns false if the result was discarded (stale origin or session
    /// no longer Active).
    pub async fn apply_pose_result(
        &self,
        origin: SubmissionOrigin,
        request_id: u64,
        result: &PoseResult,
    ) -> bool {
        let mut inner = self.inner.write().await;

        if inner.state.session_id() != Some(origin.session_id)
            || self.reset_epoch.load(Ordering::Acquire) != origin.epoch
        {
            debug!(request_id, "Discarding stale pose result");
            return false;
        }

        let reps_changed = match inner.state.apply_pose_result(result) {
            ApplyOutcome::Ignored => {
                debug!(request_id, phase = %inner.state.phase(), "Pose result ignored");
                return false;
            }
            ApplyOutcome::Applied { reps_changed } => reps_changed,
        };

        match result {
            PoseResult::Analysis(analysis) => {
                debug!(
                    request_id,
                    reported_reps = analysis.reps,
                    stage = %analysis.stage,
                    current_reps = inner.state.current_reps(),
                    "Pose result applied"
                );
                self.events.emit_lossy(CoachEvent::PoseAnalyzed {
                    session_id: origin.session_id,
                    request_id,
                    reported_reps: analysis.reps,
                    stage: analysis.stage,
                    knee_angle: analysis.knee_angle,
                    hip_angle: analysis.hip_angle,
                });
            }
            PoseResult::Error(message) => {
                debug!(request_id, "Pose submission failed: {}", message);
                self.events.emit_lossy(CoachEvent::PoseFailed {
                    session_id: origin.session_id,
                    request_id,
                    message: message.clone(),
                });
            }
        }

        if reps_changed {
            self.emit_reps(origin.session_id, &inner.state);
        }
        true
    }

    /// Manual +1 rep
    ///
    /// Applied locally first, then pushed to the backend fire-and-forget.
    /// Returns the new local count.
    pub async fn increment_rep(&self) -> Result<u32> {
        let mut inner = self.inner.write().await;
        if inner.state.increment_rep()? {
            if let Some(sync) = &inner.sync {
                sync.increment();
            }
            if let Some(session_id) = inner.state.session_id() {
                self.emit_reps(session_id, &inner.state);
            }
        } else {
            debug!("Rep target already reached, increment ignored");
        }
        Ok(inner.state.current_reps())
    }

    /// Complete the current set
    ///
    /// Fails with `Error::Precondition` until the rep target is reached.
    /// Advancing to the next set is a local reset, so the pose session and
    /// backend counter are reset too. Completing the final set stops capture
    /// and asks the backend to persist the completion.
    pub async fn request_complete_set(&self) -> Result<CompletionOutcome> {
        let (completion, session_id, exercise_id) = {
            let mut inner = self.inner.write().await;
            let completion = inner.state.request_complete_set()?;
            let session_id = inner
                .state
                .session_id()
                .ok_or_else(|| Error::Internal("Active session without id".to_string()))?;
            let exercise_id = inner.state.exercise().map_or(0, |e| e.id);

            if let SetCompletion::NextSet { .. } = completion {
                inner.begin_pose_reset(&self.reset_epoch);
                if let Some(sync) = &inner.sync {
                    sync.reset();
                }
            }
            (completion, session_id, exercise_id)
        };

        match completion {
            SetCompletion::NextSet {
                completed_set,
                next_set,
            } => {
                info!(%session_id, completed_set, next_set, "Set complete");

                self.finish_pose_reset(&format!("after set {}", completed_set))
                    .await;

                self.emit_phase(session_id, SessionPhase::Active, SessionPhase::SetComplete);
                self.events.emit_lossy(CoachEvent::SetCompleted {
                    session_id,
                    completed_set,
                    next_set,
                });
                self.emit_phase(session_id, SessionPhase::SetComplete, SessionPhase::Active);
                {
                    let inner = self.inner.read().await;
                    if inner.state.session_id() == Some(session_id) {
                        self.emit_reps(session_id, &inner.state);
                    }
                }

                Ok(CompletionOutcome::NextSet {
                    completed_set,
                    next_set,
                })
            }
            SetCompletion::ExerciseComplete { completed_set } => {
                info!(%session_id, exercise_id, "Exercise complete");
                self.emit_phase(
                    session_id,
                    SessionPhase::Active,
                    SessionPhase::ExerciseComplete,
                );

                let persisted = match self
                    .store
                    .confirm_complete(self.patient_id, exercise_id)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(exercise_id, "Completion not persisted: {}", e);
                        false
                    }
                };

                self.events.emit_lossy(CoachEvent::ExerciseCompleted {
                    session_id,
                    exercise_id,
                    persisted,
                    timestamp: Utc::now(),
                });

                Ok(CompletionOutcome::ExerciseComplete {
                    completed_set,
                    persisted,
                })
            }
        }
    }

    /// Zero the current set's reps
    ///
    /// Resets the pose service's accumulation (exactly one call) and the
    /// backend counter. Results in flight from before the reset are
    /// discarded on arrival.
    pub async fn reset_progress(&self) -> Result<()> {
        let (session_id, current_set) = {
            let mut inner = self.inner.write().await;
            inner.state.reset_progress()?;
            inner.begin_pose_reset(&self.reset_epoch);
            if let Some(sync) = &inner.sync {
                sync.reset();
            }
            let session_id = inner
                .state
                .session_id()
                .ok_or_else(|| Error::Internal("Active session without id".to_string()))?;
            (session_id, inner.state.current_set())
        };

        info!(%session_id, current_set, "Progress reset");

        self.finish_pose_reset("on progress reset").await;

        self.events.emit_lossy(CoachEvent::ProgressReset {
            session_id,
            current_set,
        });
        let inner = self.inner.read().await;
        if inner.state.session_id() == Some(session_id) {
            self.emit_reps(session_id, &inner.state);
        }
        Ok(())
    }

    /// Any phase → Idle
    ///
    /// Returns the id of the stopped session, if one was running.
    pub async fn stop(&self) -> Option<Uuid> {
        let mut inner = self.inner.write().await;
        if inner.starting {
            inner.starting = false;
            inner.start_generation += 1;
            info!("Pending start cancelled");
        }
        let old_phase = inner.state.phase();
        let stopped = inner.state.stop();
        inner.sync = None;

        if let Some(session_id) = stopped {
            info!(%session_id, "Exercise session stopped");
            self.emit_phase(session_id, old_phase, SessionPhase::Idle);
            self.events.emit_lossy(CoachEvent::SessionStopped {
                session_id,
                timestamp: Utc::now(),
            });
        }
        stopped
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.state.snapshot()
    }

    pub async fn is_capturing(&self) -> bool {
        self.inner.read().await.state.is_capturing()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.read().await.state.phase()
    }

    /// Reset the pose service's accumulation, then reopen submissions
    ///
    /// Pairs with [`Inner::begin_pose_reset`]. The epoch is bumped again once
    /// the reset has landed, so nothing issued against the old server count
    /// can be applied.
    async fn finish_pose_reset(&self, context: &str) {
        if let PoseResult::Error(message) = self.pose.reset_session().await {
            warn!("Pose session reset failed {}: {}", context, message);
        }
        let mut inner = self.inner.write().await;
        inner.pending_resets = inner.pending_resets.saturating_sub(1);
        self.reset_epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn emit_phase(&self, session_id: Uuid, old_phase: SessionPhase, new_phase: SessionPhase) {
        self.events.emit_lossy(CoachEvent::PhaseChanged {
            session_id,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }

    fn emit_reps(&self, session_id: Uuid, state: &SessionState) {
        self.events.emit_lossy(CoachEvent::RepsChanged {
            session_id,
            current_set: state.current_set(),
            current_reps: state.current_reps(),
            target_reps: state.target_reps(),
        });
    }
}
