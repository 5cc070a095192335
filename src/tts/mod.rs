// TTS backends module
// Contains implementations of the supported speech synthesis providers

pub mod elevenlabs;
pub mod google;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{PipelineConfig, ProviderKind};
use crate::error::{NotecastError, Result};

pub use elevenlabs::ElevenLabsBackend;
pub use google::GoogleBackend;
pub use openai::OpenAiBackend;

/// Audio format of the bytes a backend returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFormat {
    Mp3,
    Wav,
}

impl SegmentFormat {
    /// File extension for persisted segments
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// Trait that all TTS backends must implement.
///
/// One text chunk in, one decodable audio blob out. Backends differ only
/// in request shape, auth and voice parameters; synthesis semantics are
/// uniform across providers.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Provider name for logging and reports
    fn name(&self) -> &'static str;

    /// Provider-specific ceiling on input length, in characters
    fn max_input_chars(&self) -> usize;

    /// Format of the returned audio bytes
    fn segment_format(&self) -> SegmentFormat;

    /// Synthesize one chunk of text into audio bytes.
    ///
    /// Input longer than [`max_input_chars`](Self::max_input_chars) is
    /// rejected with `ChunkTooLarge` before any network call — a chunker
    /// configured above the provider ceiling is a configuration error
    /// that must surface early, not a reason to truncate speech.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Get the appropriate TTS backend based on the pipeline configuration
pub fn create_backend(config: &PipelineConfig) -> Result<Box<dyn TtsBackend>> {
    if config.api_key.trim().is_empty() {
        return Err(NotecastError::Configuration(format!(
            "{} API key is required for speech synthesis",
            config.provider.as_str()
        )));
    }
    match config.provider {
        ProviderKind::OpenAi => Ok(Box::new(OpenAiBackend::new(config)?)),
        ProviderKind::ElevenLabs => Ok(Box::new(ElevenLabsBackend::new(config)?)),
        ProviderKind::Google => Ok(Box::new(GoogleBackend::new(config)?)),
    }
}

/// Reject input that exceeds the provider ceiling
pub(crate) fn ensure_within_limit(text: &str, limit: usize) -> Result<()> {
    let chars = text.chars().count();
    if chars > limit {
        return Err(NotecastError::ChunkTooLarge { chars, limit });
    }
    Ok(())
}

/// Classify a non-success HTTP status into a transient or permanent
/// synthesis error. Rate limiting and server-side failures are worth
/// retrying; everything else (invalid voice, malformed input) is not.
pub(crate) fn classify_api_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> NotecastError {
    let message = extract_api_message(body);
    let description = format!("{} API error (status {}): {}", provider, status, message);
    if status.as_u16() == 429 || status.is_server_error() {
        NotecastError::TransientSynthesis(description)
    } else {
        NotecastError::PermanentSynthesis(description)
    }
}

/// Map a failed request send into a synthesis error. Timeouts and
/// connection failures are transient.
pub(crate) fn classify_send_error(provider: &str, err: reqwest::Error) -> NotecastError {
    if err.is_timeout() || err.is_connect() {
        NotecastError::TransientSynthesis(format!("{} request failed: {}", provider, err))
    } else {
        NotecastError::Http(err)
    }
}

// Providers wrap their error payloads differently; probe the common
// shapes and fall back to the raw body.
fn extract_api_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for path in [&["error", "message"][..], &["detail", "message"][..]] {
            let mut node = &json;
            let mut found = true;
            for key in path {
                match node.get(key) {
                    Some(next) => node = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(s) = node.as_str() {
                    return s.to_string();
                }
            }
        }
        if let Some(s) = json.get("detail").and_then(Value::as_str) {
            return s.to_string();
        }
    }
    if body.trim().is_empty() {
        "unknown API error".to_string()
    } else {
        body.trim().to_string()
    }
}
