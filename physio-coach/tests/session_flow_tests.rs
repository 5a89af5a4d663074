//! Exercise session flow tests
//!
//! Drives `ExerciseSession` through start, pose merging, set completion,
//! reset and stop against mock collaborators.

mod helpers;

use helpers::{analysis, exercise, MockPoseService, MockProgressStore};
use physio_coach::error::Error;
use physio_coach::services::PoseResult;
use physio_coach::session::{CompletionOutcome, ExerciseSession};
use physio_common::api::{RepAction, RepCountsResponse};
use physio_common::events::{CoachEvent, EventBus, SessionPhase, Stage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const PATIENT_ID: u32 = 1;

struct Fixture {
    pose: Arc<MockPoseService>,
    store: Arc<MockProgressStore>,
    events: Arc<EventBus>,
    session: ExerciseSession,
}

fn fixture_with_store(store: MockProgressStore) -> Fixture {
    let pose = Arc::new(MockPoseService::new());
    let store = Arc::new(store);
    let events = Arc::new(EventBus::new(64));
    let session = ExerciseSession::new(
        pose.clone(),
        store.clone(),
        Arc::clone(&events),
        PATIENT_ID,
    );
    Fixture {
        pose,
        store,
        events,
        session,
    }
}

fn fixture() -> Fixture {
    fixture_with_store(MockProgressStore::new())
}

/// Let fire-and-forget tasks run
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Apply `result` as if it came back from a submission issued just now
async fn apply_now(session: &ExerciseSession, result: PoseResult) -> bool {
    let origin = session.current_origin().await.expect("session active");
    session.apply_pose_result(origin, 1, &result).await
}

async fn reach_target(session: &ExerciseSession, reps: u32) {
    assert!(apply_now(session, analysis(reps, "")).await);
}

// ============================================================================
// Start
// ============================================================================

/// **Given:** the backend rep counter is unreachable
/// **When:** a session starts
/// **Then:** it starts at set 1 with 0 reps and the prescribed target
#[tokio::test]
async fn test_start_falls_back_when_backend_unavailable() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(snapshot.current_set, 1);
    assert_eq!(snapshot.current_reps, 0);
    assert_eq!(snapshot.target_reps, 10);
    assert_eq!(snapshot.target_sets, 3);
    assert!(snapshot.capturing);
    assert_eq!(f.pose.reset_calls(), 1, "start clears pose accumulation");
}

#[tokio::test]
async fn test_start_resumes_backend_progress() {
    let f = fixture_with_store(MockProgressStore::new().with_counts(RepCountsResponse {
        current_reps: 4,
        target_reps: 12,
        current_set: Some(2),
        target_sets: Some(3),
    }));
    f.session.start(exercise(10, 3)).await.unwrap();

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_set, 2);
    assert_eq!(snapshot.current_reps, 4);
    assert_eq!(snapshot.target_reps, 10, "prescription target wins");
}

#[tokio::test]
async fn test_start_ignores_out_of_range_backend_set() {
    let f = fixture_with_store(MockProgressStore::new().with_counts(RepCountsResponse {
        current_reps: 25,
        target_reps: 10,
        current_set: Some(7),
        target_sets: None,
    }));
    f.session.start(exercise(10, 3)).await.unwrap();

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_set, 1);
    assert_eq!(snapshot.current_reps, 10, "backend reps clamp to target");
}

#[tokio::test]
async fn test_start_while_active_fails() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();
    let result = f.session.start(exercise(10, 3)).await;
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

// ============================================================================
// Pose results
// ============================================================================

/// **Given:** local reps 5
/// **When:** the service reports 7, then 3
/// **Then:** reps become 7 and stay 7
#[tokio::test]
async fn test_pose_reps_merge_monotonically() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();

    reach_target(&f.session, 5).await;
    assert!(apply_now(&f.session, analysis(7, "")).await);
    assert_eq!(f.session.snapshot().await.current_reps, 7);

    assert!(apply_now(&f.session, analysis(3, "")).await);
    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_reps, 7);
    assert_eq!(snapshot.stage, Stage::Up);
}

#[tokio::test]
async fn test_reaching_target_does_not_advance() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();
    reach_target(&f.session, 10).await;

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_set, 1);
    assert_eq!(snapshot.phase, SessionPhase::Active);
}

#[tokio::test]
async fn test_error_result_is_applied_without_changes() {
    let f = fixture();
    let mut rx = f.events.subscribe();
    f.session.start(exercise(10, 3)).await.unwrap();
    reach_target(&f.session, 4).await;

    assert!(apply_now(&f.session, PoseResult::Error("No pose detected".to_string())).await);
    assert_eq!(f.session.snapshot().await.current_reps, 4);

    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        if let CoachEvent::PoseFailed { message, .. } = event {
            assert_eq!(message, "No pose detected");
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

/// **Given:** a submission issued before a local reset
/// **When:** its result arrives after the reset
/// **Then:** the result is discarded
#[tokio::test]
async fn test_result_from_before_reset_is_discarded() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();

    let origin = f.session.current_origin().await.unwrap();
    f.session.reset_progress().await.unwrap();

    assert!(!f.session.apply_pose_result(origin, 1, &analysis(6, "")).await);
    assert_eq!(f.session.snapshot().await.current_reps, 0);
}

#[tokio::test]
async fn test_result_from_previous_session_is_discarded() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();
    let origin = f.session.current_origin().await.unwrap();

    f.session.stop().await;
    f.session.start(exercise(10, 3)).await.unwrap();

    assert!(!f.session.apply_pose_result(origin, 1, &analysis(6, "")).await);
    assert_eq!(f.session.snapshot().await.current_reps, 0);
}

// ============================================================================
// Manual reps
// ============================================================================

#[tokio::test]
async fn test_increment_pushes_to_backend() {
    let f = fixture();
    f.session.start(exercise(2, 1)).await.unwrap();

    assert_eq!(f.session.increment_rep().await.unwrap(), 1);
    assert_eq!(f.session.increment_rep().await.unwrap(), 2);
    // Clamped at target: no change, no push
    assert_eq!(f.session.increment_rep().await.unwrap(), 2);
    settle().await;

    assert_eq!(
        f.store.actions(),
        vec![RepAction::Increment, RepAction::Increment]
    );
}

#[tokio::test]
async fn test_increment_when_idle_fails() {
    let f = fixture();
    assert!(matches!(
        f.session.increment_rep().await,
        Err(Error::InvalidState(_))
    ));
}

// ============================================================================
// Set completion
// ============================================================================

/// **Given:** target 10 reps × 3 sets
/// **When:** completing the set at 9 reps, then at 10
/// **Then:** the first attempt fails with Precondition, the second advances
#[tokio::test]
async fn test_complete_set_requires_target() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();

    reach_target(&f.session, 9).await;
    assert!(matches!(
        f.session.request_complete_set().await,
        Err(Error::Precondition(_))
    ));

    f.session.increment_rep().await.unwrap();
    let resets_before = f.pose.reset_calls();
    assert_eq!(
        f.session.request_complete_set().await.unwrap(),
        CompletionOutcome::NextSet {
            completed_set: 1,
            next_set: 2
        }
    );

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_set, 2);
    assert_eq!(snapshot.current_reps, 0);
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(f.pose.reset_calls(), resets_before + 1);

    settle().await;
    assert_eq!(f.store.actions().last(), Some(&RepAction::Reset));
}

#[tokio::test]
async fn test_set_completion_publishes_transient_phase() {
    let f = fixture();
    f.session.start(exercise(3, 2)).await.unwrap();
    let mut rx = f.events.subscribe();

    reach_target(&f.session, 3).await;
    f.session.request_complete_set().await.unwrap();

    let mut phases = Vec::new();
    let mut completed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            CoachEvent::PhaseChanged {
                old_phase,
                new_phase,
                ..
            } => phases.push((old_phase, new_phase)),
            CoachEvent::SetCompleted {
                completed_set,
                next_set,
                ..
            } => completed = Some((completed_set, next_set)),
            _ => {}
        }
    }

    assert_eq!(
        phases,
        vec![
            (SessionPhase::Active, SessionPhase::SetComplete),
            (SessionPhase::SetComplete, SessionPhase::Active),
        ]
    );
    assert_eq!(completed, Some((1, 2)));
}

/// **Given:** the final set with target reached
/// **When:** the set is completed
/// **Then:** the exercise completes, capture stops, and later results are no-ops
#[tokio::test]
async fn test_final_set_completes_exercise() {
    let f = fixture();
    f.session.start(exercise(5, 2)).await.unwrap();

    reach_target(&f.session, 5).await;
    f.session.request_complete_set().await.unwrap();
    reach_target(&f.session, 5).await;

    let origin = f.session.current_origin().await.unwrap();
    assert_eq!(
        f.session.request_complete_set().await.unwrap(),
        CompletionOutcome::ExerciseComplete {
            completed_set: 2,
            persisted: true
        }
    );
    assert_eq!(f.store.complete_calls(), 1);

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::ExerciseComplete);
    assert!(!snapshot.capturing);
    assert!(f.session.current_origin().await.is_none());

    assert!(!f.session.apply_pose_result(origin, 9, &analysis(1, "")).await);
    assert_eq!(f.session.snapshot().await.current_reps, 5);
}

/// **Given:** the backend rejects the completion
/// **When:** the final set is completed
/// **Then:** local state still completes and persisted=false is reported
#[tokio::test]
async fn test_completion_persistence_failure_keeps_local_truth() {
    let f = fixture_with_store(MockProgressStore::new().failing_completion());
    let mut rx = f.events.subscribe();
    f.session.start(exercise(1, 1)).await.unwrap();

    f.session.increment_rep().await.unwrap();
    assert_eq!(
        f.session.request_complete_set().await.unwrap(),
        CompletionOutcome::ExerciseComplete {
            completed_set: 1,
            persisted: false
        }
    );
    assert_eq!(f.session.phase().await, SessionPhase::ExerciseComplete);

    let mut persisted = None;
    while let Ok(event) = rx.try_recv() {
        if let CoachEvent::ExerciseCompleted { persisted: p, .. } = event {
            persisted = Some(p);
        }
    }
    assert_eq!(persisted, Some(false));
}

#[tokio::test]
async fn test_restart_after_completion_requires_stop() {
    let f = fixture();
    f.session.start(exercise(1, 1)).await.unwrap();
    f.session.increment_rep().await.unwrap();
    f.session.request_complete_set().await.unwrap();

    assert!(f.session.start(exercise(1, 1)).await.is_err());
    f.session.stop().await;
    assert!(f.session.start(exercise(1, 1)).await.is_ok());
}

// ============================================================================
// Reset and stop
// ============================================================================

/// **Given:** an active set with progress
/// **When:** progress is reset
/// **Then:** reps=0, stage=Unknown and reset_session is called exactly once
#[tokio::test]
async fn test_reset_progress() {
    let f = fixture();
    f.session.start(exercise(10, 3)).await.unwrap();
    reach_target(&f.session, 6).await;

    let resets_before = f.pose.reset_calls();
    f.session.reset_progress().await.unwrap();

    let snapshot = f.session.snapshot().await;
    assert_eq!(snapshot.current_reps, 0);
    assert_eq!(snapshot.stage, Stage::Unknown);
    assert_eq!(f.pose.reset_calls(), resets_before + 1);

    settle().await;
    assert_eq!(f.store.actions(), vec![RepAction::Reset]);
}

#[tokio::test]
async fn test_reset_when_idle_fails() {
    let f = fixture();
    assert!(matches!(
        f.session.reset_progress().await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(f.pose.reset_calls(), 0);
}

#[tokio::test]
async fn test_stop_returns_to_idle() {
    let f = fixture();
    let mut rx = f.events.subscribe();
    let session_id = f.session.start(exercise(10, 3)).await.unwrap();

    assert_eq!(f.session.stop().await, Some(session_id));
    assert_eq!(f.session.phase().await, SessionPhase::Idle);
    assert!(!f.session.is_capturing().await);
    assert_eq!(f.session.stop().await, None);

    let stopped = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| matches!(e, CoachEvent::SessionStopped { .. }))
        .count();
    assert_eq!(stopped, 1);
}

// ============================================================================
// Start racing stop
// ============================================================================

/// Session whose pose-session reset takes a second to land
fn slow_reset_session() -> (Arc<MockPoseService>, Arc<ExerciseSession>) {
    let pose = Arc::new(MockPoseService::new().with_reset_delay(Duration::from_secs(1)));
    let session = Arc::new(ExerciseSession::new(
        pose.clone(),
        Arc::new(MockProgressStore::new()),
        Arc::new(EventBus::new(64)),
        PATIENT_ID,
    ));
    (pose, session)
}

/// **Given:** a start still waiting on the pose service
/// **When:** stop is called
/// **Then:** the start is cancelled and the session stays Idle
#[tokio::test(start_paused = true)]
async fn test_stop_during_start_cancels_it() {
    let (_pose, session) = slow_reset_session();

    let starting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start(exercise(10, 3)).await })
    };
    sleep(Duration::from_millis(100)).await;

    assert_eq!(session.stop().await, None);
    let result = starting.await.unwrap();
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(session.phase().await, SessionPhase::Idle);
    assert!(session.current_origin().await.is_none());

    // A later start is unaffected
    session.start(exercise(10, 3)).await.unwrap();
    assert_eq!(session.phase().await, SessionPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_rejected_while_first_pending() {
    let (pose, session) = slow_reset_session();

    let starting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start(exercise(10, 3)).await })
    };
    sleep(Duration::from_millis(100)).await;

    assert!(matches!(
        session.start(exercise(10, 3)).await,
        Err(Error::InvalidState(_))
    ));
    starting.await.unwrap().unwrap();

    assert_eq!(session.phase().await, SessionPhase::Active);
    assert_eq!(pose.reset_calls(), 1, "rejected start never reaches the pose service");
}
