//! # PhysioCoach Common Library
//!
//! Shared code for the PhysioCoach crates:
//! - Wire types for the rehabilitation backend (pose, reps, TTS, exercises)
//! - Event types (CoachEvent enum) and the broadcast EventBus
//! - TOML configuration loading
//! - Common error type

pub mod api;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
