//! Pose-estimation service client
//!
//! Wraps `POST /pose` (multipart `image` upload) and `POST /reset_pose_session`.
//! The client is stateless; rep accumulation lives in the service and is
//! cleared through [`PoseService::reset_session`].
//!
//! Network failure is an ordinary result here, not an error: every failure
//! path produces `PoseResult::Error` and the capture loop carries on. No retry
//! is attempted inside a call since the next capture tick retries naturally.

use super::{build_http_client, PoseService};
use crate::error::Result;
use async_trait::async_trait;
use physio_common::api::PoseResponse;
use physio_common::events::Stage;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, warn};

/// Successful analysis of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PoseAnalysis {
    /// Cumulative reps counted by the service for the current pose session
    pub reps: u32,
    pub stage: Stage,
    /// Degrees
    pub knee_angle: Option<f64>,
    /// Degrees
    pub hip_angle: Option<f64>,
    /// Coaching text; empty when the service has nothing to say
    pub feedback: String,
}

/// Outcome of a pose-service call
///
/// Numeric fields only exist on `Analysis`, so an error can never carry stale
/// angles or counts.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseResult {
    Analysis(PoseAnalysis),
    Error(String),
}

impl PoseResult {
    pub fn is_error(&self) -> bool {
        matches!(self, PoseResult::Error(_))
    }

    /// Feedback worth speaking: non-empty text on a successful analysis
    pub fn spoken_feedback(&self) -> Option<&str> {
        match self {
            PoseResult::Analysis(analysis) => {
                let text = analysis.feedback.trim();
                (!text.is_empty()).then_some(text)
            }
            PoseResult::Error(_) => None,
        }
    }
}

impl From<PoseResponse> for PoseResult {
    fn from(response: PoseResponse) -> Self {
        if let Some(error) = response.error {
            return PoseResult::Error(error);
        }
        PoseResult::Analysis(PoseAnalysis {
            reps: response.reps.unwrap_or(0),
            stage: response
                .stage
                .as_deref()
                .map(Stage::from_wire)
                .unwrap_or_default(),
            knee_angle: response.knee_angle,
            hip_angle: response.hip_angle,
            feedback: response.feedback.unwrap_or_default(),
        })
    }
}

/// HTTP implementation of [`PoseService`]
pub struct PoseClient {
    http: reqwest::Client,
    base_url: String,
}

impl PoseClient {
    /// Create a client for `base_url` (no trailing slash)
    ///
    /// `timeout` bounds each call end to end.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_result(response: reqwest::Response) -> PoseResult {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return PoseResult::Error(format!("Failed to read pose response: {}", e)),
        };

        match serde_json::from_str::<PoseResponse>(&body) {
            Ok(parsed) if status.is_success() => parsed.into(),
            Ok(parsed) => PoseResult::Error(
                parsed
                    .error
                    .unwrap_or_else(|| format!("Pose service returned {}", status)),
            ),
            Err(e) if status.is_success() => {
                PoseResult::Error(format!("Malformed pose response: {}", e))
            }
            Err(_) => PoseResult::Error(format!("Pose service returned {}", status)),
        }
    }
}

#[async_trait]
impl PoseService for PoseClient {
    async fn submit_frame(&self, jpeg: Vec<u8>) -> PoseResult {
        let size = jpeg.len();
        let part = match Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
        {
            Ok(part) => part,
            Err(e) => return PoseResult::Error(format!("Failed to build upload: {}", e)),
        };
        let form = Form::new().part("image", part);

        debug!(bytes = size, "Submitting frame to pose service");

        let response = match self.http.post(self.url("/pose")).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Pose request failed: {}", e);
                return PoseResult::Error(format!("Pose request failed: {}", e));
            }
        };

        Self::read_result(response).await
    }

    async fn reset_session(&self) -> PoseResult {
        debug!("Resetting pose session");

        let response = match self.http.post(self.url("/reset_pose_session")).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Pose session reset failed: {}", e);
                return PoseResult::Error(format!("Pose session reset failed: {}", e));
            }
        };

        Self::read_result(response).await
    }
}
