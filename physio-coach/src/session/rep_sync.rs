//! Backend rep counter reconciliation
//!
//! The backend holds the authoritative rep counter; the session keeps a local
//! copy that is updated optimistically. Local changes are pushed
//! fire-and-forget: a failed push is logged and never undoes the local value.

use crate::services::ProgressStore;
use crate::session::{ExerciseDefinition, RepCounter};
use physio_common::api::RepAction;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Starting point for a session, as fetched from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialProgress {
    pub counter: RepCounter,
    /// Set to resume at; 1 unless the backend reported an in-range set
    pub current_set: u32,
}

impl InitialProgress {
    /// Fresh start: set 1, zero reps
    pub fn fresh(exercise: &ExerciseDefinition) -> Self {
        Self {
            counter: RepCounter::new(0, exercise.target_reps),
            current_set: 1,
        }
    }
}

/// Pushes local rep changes to the backend counter
pub struct RepCounterSync {
    store: Arc<dyn ProgressStore>,
    patient_id: u32,
    exercise_id: u32,
}

impl RepCounterSync {
    pub fn new(store: Arc<dyn ProgressStore>, patient_id: u32, exercise_id: u32) -> Self {
        Self {
            store,
            patient_id,
            exercise_id,
        }
    }

    pub fn exercise_id(&self) -> u32 {
        self.exercise_id
    }

    /// Load the backend counter
    ///
    /// Falls back to zero reps when the backend is unreachable. The target
    /// always comes from the definition.
    ///
    /// An in-range `current_set` is resumed. The progress backend never
    /// advances it today (it stays at 1), so in practice every start
    /// resumes set 1; stores that do track sets are honored.
    pub async fn fetch_initial(&self, exercise: &ExerciseDefinition) -> InitialProgress {
        let counts = match self
            .store
            .fetch_reps(self.patient_id, self.exercise_id)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(
                    exercise_id = self.exercise_id,
                    "Failed to fetch rep counts, starting from zero: {}", e
                );
                return InitialProgress::fresh(exercise);
            }
        };

        if counts.target_reps != exercise.target_reps {
            info!(
                exercise_id = self.exercise_id,
                backend_target = counts.target_reps,
                local_target = exercise.target_reps,
                "Backend rep target differs from prescription, using prescription"
            );
        }

        let current_set = match counts.current_set {
            Some(set) if (1..=exercise.target_sets).contains(&set) => set,
            Some(set) => {
                warn!(
                    exercise_id = self.exercise_id,
                    reported_set = set,
                    "Backend set out of range, starting at set 1"
                );
                1
            }
            None => 1,
        };

        let mut counter = RepCounter::new(0, exercise.target_reps);
        Self::merge(&mut counter, counts.current_reps);

        debug!(
            exercise_id = self.exercise_id,
            current_set,
            current_reps = counter.current(),
            "Fetched initial progress"
        );
        InitialProgress {
            counter,
            current_set,
        }
    }

    /// Adopt `max(local, reported)`, clamped to target
    pub fn merge(counter: &mut RepCounter, reported: u32) -> bool {
        counter.merge_reported(reported)
    }

    /// Push a local +1 (already applied to the local counter)
    pub fn increment(&self) -> JoinHandle<()> {
        self.push(RepAction::Increment)
    }

    /// Push a local reset (already applied to the local counter)
    pub fn reset(&self) -> JoinHandle<()> {
        self.push(RepAction::Reset)
    }

    fn push(&self, action: RepAction) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let patient_id = self.patient_id;
        let exercise_id = self.exercise_id;

        tokio::spawn(async move {
            match store.post_rep_action(patient_id, exercise_id, action).await {
                Ok(()) => debug!(exercise_id, %action, "Rep action synced"),
                Err(e) => warn!(exercise_id, %action, "Rep action not synced: {}", e),
            }
        })
    }
}
