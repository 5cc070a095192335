//! ElevenLabs TTS backend.
//!
//! `POST https://api.elevenlabs.io/v1/text-to-speech/{voice_id}` with
//! the `xi-api-key` header. Input ceiling: 5000 characters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::error::{NotecastError, Result};
use crate::tts::{classify_api_error, classify_send_error, ensure_within_limit, SegmentFormat, TtsBackend};

const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// ElevenLabs input limit, in characters
pub const ELEVENLABS_MAX_INPUT_CHARS: usize = 5000;

const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Клиент для работы с ElevenLabs API
pub struct ElevenLabsBackend {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsBackend {
    /// Создает новый клиент ElevenLabs TTS
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        if config.voice.trim().is_empty() {
            return Err(NotecastError::Configuration(
                "elevenlabs requires a voice id (see https://api.elevenlabs.io/v1/voices)".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            voice_id: config.voice.clone(),
            model_id: if config.model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                config.model.clone()
            },
        })
    }
}

#[async_trait]
impl TtsBackend for ElevenLabsBackend {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn max_input_chars(&self) -> usize {
        ELEVENLABS_MAX_INPUT_CHARS
    }

    fn segment_format(&self) -> SegmentFormat {
        SegmentFormat::Mp3
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        ensure_within_limit(text, self.max_input_chars())?;

        let url = format!("{}/{}", ELEVENLABS_TTS_URL, self.voice_id);
        let response = self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": self.model_id,
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                    "style": 0.0,
                    "use_speaker_boost": true,
                },
            }))
            .send()
            .await
            .map_err(|e| classify_send_error("elevenlabs", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error("elevenlabs", status, &body));
        }

        let audio = response.bytes().await?.to_vec();
        log::debug!("elevenlabs returned {} bytes of mp3 audio", audio.len());
        Ok(audio)
    }
}
