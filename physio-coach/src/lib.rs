//! # PhysioCoach Library (physio-coach)
//!
//! Exercise capture-and-feedback loop for home rehabilitation.
//!
//! **Purpose:** Periodically capture camera frames during a prescribed
//! exercise, submit them to the pose-estimation service, track set/rep
//! progress against the backend counter, and speak the service's feedback
//! back to the patient.
//!
//! **Architecture:** tokio tasks around a single session state machine.
//! `CaptureScheduler` drives capture; `ExerciseSession` owns the state;
//! `NarratorAudioChannel` arbitrates the one audio output
//! (symphonia + rubato + cpal).

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod services;
pub mod session;

pub use error::{Error, Result};
pub use session::ExerciseSession;
