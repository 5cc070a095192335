//! Google Cloud Text-to-Speech backend.
//!
//! `POST https://texttospeech.googleapis.com/v1/text:synthesize` with an
//! API key. The response carries base64-encoded audio in `audioContent`.
//! Input ceiling: 5000 characters.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::error::{NotecastError, Result};
use crate::tts::{classify_api_error, classify_send_error, ensure_within_limit, SegmentFormat, TtsBackend};

const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Google Cloud TTS input limit, in characters
pub const GOOGLE_MAX_INPUT_CHARS: usize = 5000;

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Клиент для работы с Google Cloud Text-to-Speech
pub struct GoogleBackend {
    client: Client,
    api_key: String,
    voice_name: String,
    language_code: String,
}

impl GoogleBackend {
    /// Создает новый клиент Google Cloud TTS
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            voice_name: config.voice.clone(),
            language_code: config.language.clone(),
        })
    }
}

#[async_trait]
impl TtsBackend for GoogleBackend {
    fn name(&self) -> &'static str {
        "google"
    }

    fn max_input_chars(&self) -> usize {
        GOOGLE_MAX_INPUT_CHARS
    }

    fn segment_format(&self) -> SegmentFormat {
        SegmentFormat::Mp3
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        ensure_within_limit(text, self.max_input_chars())?;

        let mut voice = json!({ "languageCode": self.language_code });
        if !self.voice_name.is_empty() {
            voice["name"] = json!(self.voice_name);
        }

        let response = self
            .client
            .post(GOOGLE_TTS_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "input": { "text": text },
                "voice": voice,
                "audioConfig": { "audioEncoding": "MP3" },
            }))
            .send()
            .await
            .map_err(|e| classify_send_error("google", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error("google", status, &body));
        }

        let payload: SynthesizeResponse = response.json().await?;
        let audio = BASE64.decode(payload.audio_content.as_bytes()).map_err(|e| {
            NotecastError::PermanentSynthesis(format!("google returned invalid base64 audio: {}", e))
        })?;
        log::debug!("google returned {} bytes of mp3 audio", audio.len());
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tag_passed_through() {
        let config = PipelineConfig {
            api_key: "test-key".to_string(),
            language: "pl-PL".to_string(),
            ..PipelineConfig::default()
        };
        let backend = GoogleBackend::new(&config).unwrap();
        assert_eq!(backend.language_code, "pl-PL");
        assert_eq!(backend.max_input_chars(), 5000);
        assert_eq!(backend.segment_format(), SegmentFormat::Mp3);
    }
}
