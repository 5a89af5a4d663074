//! Text-to-speech client (`POST /tts`)

use super::{api_error, build_http_client, SpeechSynthesizer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use physio_common::api::TtsRequest;
use std::time::Duration;
use tracing::debug;

/// HTTP implementation of [`SpeechSynthesizer`]
pub struct TtsClient {
    http: reqwest::Client,
    base_url: String,
}

impl TtsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(format!("{}/tts", self.base_url))
            .json(&TtsRequest {
                text: text.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Decode("TTS service returned no audio".to_string()));
        }

        debug!(bytes = audio.len(), "Received synthesized speech");
        Ok(audio.to_vec())
    }
}
