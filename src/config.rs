//! Модуль конфигурации конвейера
//!
//! Содержит структуры и перечисления для настройки всех этапов:
//! разбиение текста, выбор TTS-провайдера, политика повторов,
//! сборка и упаковка аудиокниги.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{NotecastError, Result};

/// TTS-провайдер для синтеза речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI Speech API
    OpenAi,
    /// ElevenLabs API
    ElevenLabs,
    /// Google Cloud Text-to-Speech
    Google,
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::OpenAi
    }
}

impl ProviderKind {
    /// Получить строковое представление провайдера
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
            Self::Google => "google",
        }
    }

    /// Разобрать провайдера из строки конфигурации
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" | "eleven-labs" => Ok(Self::ElevenLabs),
            "google" | "google-cloud" => Ok(Self::Google),
            other => Err(NotecastError::Configuration(format!(
                "unsupported TTS provider: {}. Supported providers: openai, elevenlabs, google",
                other
            ))),
        }
    }
}

/// Целевой формат перекодирования
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    /// MPEG Layer III
    Mp3,
    /// AAC в контейнере .m4a
    Aac,
}

impl OutputFormat {
    /// Расширение выходного файла
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "m4a",
        }
    }

    /// Аудио-кодек для ffmpeg
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Aac => "aac",
        }
    }

    /// Битрейт по умолчанию
    pub fn default_bitrate(&self) -> &'static str {
        match self {
            Self::Mp3 => "320k",
            Self::Aac => "256k",
        }
    }
}

/// Настройки разбиения текста на фрагменты
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Максимальный размер фрагмента в символах
    pub max_chunk_size: usize,
    /// Минимальный размер фрагмента в символах
    pub min_chunk_size: usize,
    /// Удалять markdown-разметку перед озвучиванием
    pub clean_markdown: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            // Лимит OpenAI Speech API
            max_chunk_size: 4096,
            min_chunk_size: 200,
            clean_markdown: true,
        }
    }
}

/// Политика повторов при временных ошибках провайдера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Максимальное количество попыток на фрагмент
    pub max_attempts: u32,
    /// Базовая задержка перед повтором, мс
    pub backoff_base_ms: u64,
    /// Множитель экспоненциальной задержки
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Задержка перед попыткой с номером `attempt` (нумерация с 1)
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        (self.backoff_base_ms as f64 * factor) as u64
    }
}

/// Метаданные аудиокниги для упаковки в контейнер
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// Название книги
    pub title: String,
    /// Автор
    pub author: String,
    /// Путь к обложке (jpg/png)
    pub cover: Option<PathBuf>,
}

/// Конфигурация конвейера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Выбранный TTS-провайдер
    pub provider: ProviderKind,
    /// API ключ провайдера
    pub api_key: String,
    /// Идентификатор голоса (провайдер-специфичный)
    pub voice: String,
    /// Модель синтеза (для OpenAI/ElevenLabs)
    pub model: String,
    /// Языковой тег (для Google, например "pl-PL")
    pub language: String,
    /// Настройки разбиения текста
    pub chunking: ChunkingConfig,
    /// Политика повторов
    pub retry: RetryConfig,
    /// Максимальное количество одновременных запросов к API
    pub max_concurrent_requests: usize,
    /// Таймаут одного запроса синтеза, секунды
    pub request_timeout_secs: u64,
    /// Пауза между сегментами при сборке, мс
    pub silence_ms: u64,
    /// Собирать дорожку даже если часть фрагментов не озвучена
    pub allow_partial: bool,
    /// Целевой формат перекодирования (None — оставить WAV)
    pub transcode_to: Option<OutputFormat>,
    /// Битрейт перекодирования (None — значение формата по умолчанию)
    pub bitrate: Option<String>,
    /// Упаковывать в M4B-аудиокнигу
    pub package_m4b: bool,
    /// Битрейт AAC внутри M4B
    pub m4b_bitrate: String,
    /// Метаданные контейнера
    pub metadata: ContainerMetadata,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: String::new(),
            voice: String::new(),
            model: String::new(),
            language: "en-US".to_string(),
            chunking: ChunkingConfig::default(),
            retry: RetryConfig::default(),
            max_concurrent_requests: 4,
            request_timeout_secs: 300,
            silence_ms: 500,
            allow_partial: false,
            transcode_to: None,
            bitrate: None,
            package_m4b: false,
            m4b_bitrate: "64k".to_string(),
            metadata: ContainerMetadata::default(),
        }
    }
}
