//! Patient progress client
//!
//! Rep counter, exercise completion and today's exercise list, all under
//! `/patients/{patient_id}/exercises`.

use super::{api_error, build_http_client, ProgressStore};
use crate::error::Result;
use crate::session::ExerciseDefinition;
use async_trait::async_trait;
use physio_common::api::{ExerciseSummary, RepAction, RepActionRequest, RepCountsResponse};
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP implementation of [`ProgressStore`]
pub struct ProgressClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProgressClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn reps_url(&self, patient_id: u32, exercise_id: u32) -> String {
        format!(
            "{}/patients/{}/exercises/{}/reps",
            self.base_url, patient_id, exercise_id
        )
    }

    fn complete_url(&self, patient_id: u32, exercise_id: u32) -> String {
        format!(
            "{}/patients/{}/exercises/{}/complete",
            self.base_url, patient_id, exercise_id
        )
    }

    fn today_url(&self, patient_id: u32) -> String {
        format!("{}/patients/{}/exercises/today", self.base_url, patient_id)
    }
}

#[async_trait]
impl ProgressStore for ProgressClient {
    async fn fetch_reps(&self, patient_id: u32, exercise_id: u32) -> Result<RepCountsResponse> {
        let response = self
            .http
            .get(self.reps_url(patient_id, exercise_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let counts: RepCountsResponse = response.json().await?;
        debug!(
            patient_id,
            exercise_id,
            current_reps = counts.current_reps,
            target_reps = counts.target_reps,
            "Fetched rep counter"
        );
        Ok(counts)
    }

    async fn post_rep_action(
        &self,
        patient_id: u32,
        exercise_id: u32,
        action: RepAction,
    ) -> Result<()> {
        let response = self
            .http
            .post(self.reps_url(patient_id, exercise_id))
            .json(&RepActionRequest { action })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        debug!(patient_id, exercise_id, %action, "Rep action accepted");
        Ok(())
    }

    async fn confirm_complete(&self, patient_id: u32, exercise_id: u32) -> Result<()> {
        let response = self
            .http
            .post(self.complete_url(patient_id, exercise_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        info!(patient_id, exercise_id, "Exercise completion persisted");
        Ok(())
    }

    async fn todays_exercises(&self, patient_id: u32) -> Result<Vec<ExerciseDefinition>> {
        let response = self.http.get(self.today_url(patient_id)).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let summaries: Vec<ExerciseSummary> = response.json().await?;
        let mut exercises = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match ExerciseDefinition::from_summary(&summary) {
                Ok(exercise) => exercises.push(exercise),
                Err(e) => warn!(exercise_id = summary.id, "Skipping exercise: {}", e),
            }
        }
        Ok(exercises)
    }
}
