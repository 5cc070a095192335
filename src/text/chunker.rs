//! Narrative text chunking.
//!
//! Splits an arbitrary-length document into bounded-size chunks along
//! sentence and paragraph boundaries so every chunk fits into a single
//! TTS request. The split is lossless: concatenating the chunk texts
//! (ignoring boundary whitespace) reconstructs the source document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ChunkingConfig;
use crate::error::{NotecastError, Result};

/// A bounded-length slice of narrative text, synthesized independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the document, contiguous from 0
    pub index: usize,
    /// Chunk text
    pub text: String,
}

impl Chunk {
    /// Number of characters in the chunk text
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

// A paragraph break is one or more blank lines.
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

// A sentence ends with terminal punctuation, optionally followed by a
// closing quote or bracket, then whitespace. Conservative on purpose:
// abbreviations ("Mr. Smith") produce an extra boundary, which only
// shortens a chunk and never corrupts it.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…]+["'»)\]]*\s+"#).unwrap());

/// Split a document into ordered chunks.
///
/// Sentences are accumulated greedily until adding the next one would
/// exceed `max_chunk_size`. A paragraph break closes the current chunk
/// once it holds at least `min_chunk_size` characters. A single sentence
/// longer than `max_chunk_size` becomes its own oversized chunk, never
/// truncated mid-sentence.
pub fn split(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Err(NotecastError::EmptyDocument);
    }

    let mut builder = ChunkBuilder::new(config.max_chunk_size);

    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    for (pi, paragraph) in paragraphs.iter().enumerate() {
        for sentence in split_sentences(paragraph) {
            builder.push_sentence(&sentence);
        }
        // Keep paragraphs from bleeding together when the chunk is
        // already big enough, but never force a tiny chunk.
        let last_paragraph = pi + 1 == paragraphs.len();
        if !last_paragraph {
            if builder.current_len >= config.min_chunk_size {
                builder.close_current();
            } else {
                builder.mark_paragraph_break();
            }
        }
    }
    builder.close_current();

    log::debug!(
        "split {} chars into {} chunk(s)",
        text.chars().count(),
        builder.chunks.len()
    );
    Ok(builder.chunks)
}

/// Split one paragraph into trimmed sentences.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_END.find_iter(paragraph) {
        let sentence = paragraph[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = boundary.end();
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

struct ChunkBuilder {
    max_chunk_size: usize,
    chunks: Vec<Chunk>,
    current: String,
    current_len: usize,
    pending_paragraph_break: bool,
}

impl ChunkBuilder {
    fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
            pending_paragraph_break: false,
        }
    }

    fn push_sentence(&mut self, sentence: &str) {
        let sentence_len = sentence.chars().count();
        let separator_len = if self.pending_paragraph_break { 2 } else { 1 };
        if self.current_len > 0
            && self.current_len + separator_len + sentence_len > self.max_chunk_size
        {
            self.close_current();
        }
        if self.current_len == 0 {
            self.current.push_str(sentence);
            self.current_len = sentence_len;
            self.pending_paragraph_break = false;
            return;
        }
        if self.pending_paragraph_break {
            self.current.push_str("\n\n");
            self.pending_paragraph_break = false;
        } else {
            self.current.push(' ');
        }
        self.current.push_str(sentence);
        self.current_len += separator_len + sentence_len;
    }

    fn mark_paragraph_break(&mut self) {
        if self.current_len > 0 {
            self.pending_paragraph_break = true;
        }
    }

    fn close_current(&mut self) {
        if self.current_len == 0 {
            return;
        }
        let index = self.chunks.len();
        self.chunks.push(Chunk {
            index,
            text: std::mem::take(&mut self.current),
        });
        self.current_len = 0;
        self.pending_paragraph_break = false;
    }
}
