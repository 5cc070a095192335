//! Модуль обработки ошибок
//!
//! Содержит типы ошибок, которые могут возникнуть при работе конвейера:
//! от разбиения текста на фрагменты до упаковки готовой аудиокниги.

use thiserror::Error;

/// Собственный тип ошибок для библиотеки
#[derive(Debug, Error)]
pub enum NotecastError {
    /// Входной документ пуст или состоит только из пробельных символов
    #[error("input document is empty or whitespace-only")]
    EmptyDocument,

    /// Фрагмент текста превышает лимит выбранного TTS-провайдера
    #[error("chunk of {chars} chars exceeds provider limit of {limit}")]
    ChunkTooLarge { chars: usize, limit: usize },

    /// Временная ошибка синтеза речи (429, 5xx, таймаут) — можно повторить
    #[error("transient synthesis error: {0}")]
    TransientSynthesis(String),

    /// Постоянная ошибка синтеза речи (неверный голос, плохой запрос)
    #[error("permanent synthesis error: {0}")]
    PermanentSynthesis(String),

    /// Часть фрагментов не была озвучена, сборка без них запрещена
    #[error("{} chunk(s) failed synthesis: {}", failed.len(), summarize_failures(failed))]
    PartialSynthesis { failed: Vec<FailedChunk> },

    /// При сборке отсутствует сегмент с указанным индексом
    #[error("missing audio segment for index {0}")]
    MissingSegment(usize),

    /// Ошибка перекодирования аудио
    #[error("transcode error: {0}")]
    Transcode(String),

    /// Ошибка упаковки аудиокниги
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Ошибка аудио-обработки
    #[error("audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка конфигурации
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка WAV-кодирования
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Ошибка WAV-декодирования
    #[error("WAV decoding error: {0}")]
    WavDecoding(hound::Error),

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Описание фрагмента, который не удалось озвучить
#[derive(Debug, Clone)]
pub struct FailedChunk {
    /// Индекс фрагмента
    pub index: usize,
    /// Начало текста фрагмента
    pub excerpt: String,
    /// Последняя ошибка
    pub error: String,
    /// Сколько попыток было сделано
    pub attempts: u32,
}

fn summarize_failures(failed: &[FailedChunk]) -> String {
    failed
        .iter()
        .map(|f| format!("#{} after {} attempt(s): {}", f.index, f.attempts, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl NotecastError {
    /// Временные ошибки можно повторять с экспоненциальной задержкой
    pub fn is_transient(&self) -> bool {
        match self {
            NotecastError::TransientSynthesis(_) => true,
            NotecastError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Тип Result для всей библиотеки
pub type Result<T> = std::result::Result<T, NotecastError>;
