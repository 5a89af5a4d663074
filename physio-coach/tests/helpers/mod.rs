//! Test helper modules for physio-coach integration tests
//!
//! Provides reusable test infrastructure components:
//! - Mocks: in-memory pose, progress, TTS, audio and frame collaborators
//! - FakeBackend: in-process axum server speaking the backend's REST API
//! - Fixtures: exercise definitions, pose results and WAV clips

#![allow(dead_code)]

pub mod fake_backend;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use fake_backend::{FakeBackend, RecordedRequest};
pub use fixtures::{analysis, exercise, wav_bytes};
pub use mocks::{
    MockAudioSink, MockPoseService, MockProgressStore, MockSynth, StaticFrameSource,
};
