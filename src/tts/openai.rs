//! OpenAI Speech API backend.
//!
//! `POST https://api.openai.com/v1/audio/speech` with bearer auth.
//! Models: tts-1, tts-1-hd. Input ceiling: 4096 characters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::tts::{classify_api_error, classify_send_error, ensure_within_limit, SegmentFormat, TtsBackend};

const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// OpenAI Speech API input limit, in characters
pub const OPENAI_MAX_INPUT_CHARS: usize = 4096;

const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "nova";

/// Клиент для работы с OpenAI Speech API
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiBackend {
    /// Создает новый клиент OpenAI TTS
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: if config.model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                config.model.clone()
            },
            voice: if config.voice.is_empty() {
                DEFAULT_VOICE.to_string()
            } else {
                config.voice.clone()
            },
        })
    }
}

#[async_trait]
impl TtsBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn max_input_chars(&self) -> usize {
        OPENAI_MAX_INPUT_CHARS
    }

    fn segment_format(&self) -> SegmentFormat {
        SegmentFormat::Mp3
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        ensure_within_limit(text, self.max_input_chars())?;

        let response = self
            .client
            .post(OPENAI_TTS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "response_format": "mp3",
            }))
            .send()
            .await
            .map_err(|e| classify_send_error("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error("openai", status, &body));
        }

        let audio = response.bytes().await?.to_vec();
        log::debug!("openai returned {} bytes of mp3 audio", audio.len());
        Ok(audio)
    }
}
