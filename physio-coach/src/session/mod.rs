//! Exercise session: definitions, state machine, rep sync and orchestration

pub mod controller;
pub mod exercise;
pub mod rep_sync;
pub mod state;

pub use controller::{CompletionOutcome, ExerciseSession, SubmissionOrigin};
pub use exercise::{Difficulty, ExerciseDefinition};
pub use rep_sync::{InitialProgress, RepCounterSync};
pub use state::{ApplyOutcome, RepCounter, SessionSnapshot, SessionState, SetCompletion};
