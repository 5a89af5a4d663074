//! Wire types for the rehabilitation backend
//!
//! Request and response bodies exchanged with the pose-estimation, TTS and
//! patient-progress endpoints. These mirror the JSON shapes exactly; the
//! domain types built from them live in `physio-coach`.

use serde::{Deserialize, Serialize};

// ========================================
// Pose Estimation
// ========================================

/// Response body of `POST /pose` and `POST /reset_pose_session`
///
/// The service returns either the analysis fields or a single `error` field.
/// Every field is optional on the wire; older service builds omit `reps`,
/// `stage` and `hip_angle` and send a free-form `message` instead.
///
/// # Examples
///
/// ```
/// use physio_common::api::PoseResponse;
///
/// let body = r#"{"reps": 4, "stage": "up", "knee_angle": 171.2, "hip_angle": 95.0, "feedback": "Good depth"}"#;
/// let response: PoseResponse = serde_json::from_str(body).unwrap();
/// assert_eq!(response.reps, Some(4));
/// assert!(response.error.is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PoseResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Knee angle in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knee_angle: Option<f64>,

    /// Hip angle in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hip_angle: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ========================================
// Text To Speech
// ========================================

/// Request body of `POST /tts`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TtsRequest {
    pub text: String,
}

// ========================================
// Rep Tracking
// ========================================

/// Response body of `GET /patients/{patient}/exercises/{exercise}/reps`
///
/// `current_set` and `target_sets` are only present on backends that track
/// set progress alongside reps.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepCountsResponse {
    pub current_reps: u32,
    pub target_reps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_set: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sets: Option<u32>,
}

/// Action posted to `POST /patients/{patient}/exercises/{exercise}/reps`
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepAction {
    Increment,
    Reset,
}

impl std::fmt::Display for RepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepAction::Increment => write!(f, "increment"),
            RepAction::Reset => write!(f, "reset"),
        }
    }
}

/// Request body carrying a [`RepAction`]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepActionRequest {
    pub action: RepAction,
}

// ========================================
// Exercise Catalog
// ========================================

/// One entry of `GET /patients/{patient}/exercises/today`
///
/// `duration` is in minutes. `instructions` is a single free-text block,
/// one instruction per line.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExerciseSummary {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub difficulty: String,
    pub duration: u32,
    pub sets: u32,
    pub reps: u32,
    /// "pending" or "completed"
    #[serde(default)]
    pub status: String,
}

impl ExerciseSummary {
    /// True once the backend has recorded a session for this exercise today
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }
}

// ========================================
// Error Responses
// ========================================

/// Generic `{ "error": "..." }` body returned by backend failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
