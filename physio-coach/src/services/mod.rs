//! Clients for the rehabilitation backend
//!
//! Each collaborator sits behind a trait so the session and capture logic can
//! be driven by in-memory fakes in tests:
//! - [`PoseService`]: pose estimation and pose-session reset
//! - [`ProgressStore`]: rep counter, completion confirmation, exercise list
//! - [`SpeechSynthesizer`]: text to speech
//!
//! The HTTP implementations share one reqwest client configuration.

pub mod pose_client;
pub mod progress_client;
pub mod tts_client;

pub use pose_client::{PoseAnalysis, PoseClient, PoseResult};
pub use progress_client::ProgressClient;
pub use tts_client::TtsClient;

use crate::error::{Error, Result};
use crate::session::ExerciseDefinition;
use async_trait::async_trait;
use physio_common::api::{ErrorResponse, RepAction, RepCountsResponse};
use std::time::Duration;

/// Connect timeout for every backend call
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pose-estimation collaborator
///
/// Both calls are infallible by signature: transport and service failures
/// come back as [`PoseResult::Error`].
#[async_trait]
pub trait PoseService: Send + Sync {
    /// Upload one compressed (JPEG) frame for analysis
    async fn submit_frame(&self, jpeg: Vec<u8>) -> PoseResult;

    /// Zero the service's rep/stage accumulation
    async fn reset_session(&self) -> PoseResult;
}

/// Patient progress collaborator
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Current rep counter for one exercise
    async fn fetch_reps(&self, patient_id: u32, exercise_id: u32) -> Result<RepCountsResponse>;

    /// Post an increment or reset action
    async fn post_rep_action(&self, patient_id: u32, exercise_id: u32, action: RepAction)
        -> Result<()>;

    /// Confirm server-side persistence of an exercise completion
    async fn confirm_complete(&self, patient_id: u32, exercise_id: u32) -> Result<()>;

    /// Exercises assigned for today
    async fn todays_exercises(&self, patient_id: u32) -> Result<Vec<ExerciseDefinition>>;
}

/// Text-to-speech collaborator
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Encoded audio (MP3 from the backend) for `text`
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Build the shared HTTP client configuration
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(physio_common::config::get_user_agent())
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-success response into `Error::Api`
///
/// Uses the backend's `{ "error": ... }` body when present.
pub(crate) async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Error::Api { status, message }
}
