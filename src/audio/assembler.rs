//! Ordered assembly of audio segments into one continuous track.
//!
//! Segments are consumed strictly in index order, decoded to the common
//! PCM representation and concatenated with a configurable silence gap
//! between consecutive segments. A chapter mark is recorded at the start
//! of each segment's contribution so the packager can emit chapters.

use std::path::{Path, PathBuf};

use crate::audio::format::{decode_file, duration_secs, encode_wav};
use crate::error::{NotecastError, Result};

/// One persisted audio segment, the synthesis result of one chunk
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Index of the source chunk (1:1 mapping)
    pub index: usize,
    /// Persisted segment file
    pub path: PathBuf,
    /// Chapter label; `Part N` when not provided
    pub label: Option<String>,
}

impl AudioSegment {
    pub fn new(index: usize, path: PathBuf) -> Self {
        Self {
            index,
            path,
            label: None,
        }
    }
}

/// Chapter boundary derived from a segment start
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterMark {
    /// Index of the source segment
    pub index: usize,
    /// Offset of the segment start within the track, seconds
    pub start_secs: f64,
    /// Human-readable chapter title
    pub title: String,
}

/// Continuous audio track assembled from ordered segments
#[derive(Debug)]
pub struct AssembledTrack {
    /// Mono PCM samples
    pub samples: Vec<f32>,
    /// Sample rate of the track
    pub sample_rate: u32,
    /// One chapter mark per source segment, in index order
    pub chapters: Vec<ChapterMark>,
    /// Decoded duration of each source segment, seconds
    pub segment_durations: Vec<f64>,
}

impl AssembledTrack {
    /// Total duration of the track in seconds
    pub fn duration_secs(&self) -> f64 {
        duration_secs(self.samples.len(), self.sample_rate)
    }

    /// Write the track as a 32-bit float WAV file
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        encode_wav(&self.samples, self.sample_rate, path)
    }
}

/// Merge ordered segments into one continuous stream.
///
/// The segment sequence must be contiguous by index starting at 0;
/// a hole fails with `MissingSegment` naming the first missing index —
/// assembly never silently skips a gap. `silence_ms` of silence is
/// inserted between consecutive segments, not before the first or after
/// the last.
pub fn assemble(segments: &[AudioSegment], silence_ms: u64) -> Result<AssembledTrack> {
    if segments.is_empty() {
        return Err(NotecastError::AudioProcessing(
            "no segments to assemble".to_string(),
        ));
    }

    let mut ordered: Vec<&AudioSegment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);
    for (position, segment) in ordered.iter().enumerate() {
        if segment.index != position {
            return Err(NotecastError::MissingSegment(position));
        }
    }

    log::info!(
        "assembling {} segment(s) with {} ms of silence between them",
        ordered.len(),
        silence_ms
    );

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = 0u32;
    let mut chapters = Vec::with_capacity(ordered.len());
    let mut segment_durations = Vec::with_capacity(ordered.len());

    for (position, segment) in ordered.iter().enumerate() {
        let (pcm, rate) = decode_file(&segment.path)?;
        if sample_rate == 0 {
            sample_rate = rate;
        } else if rate != sample_rate {
            return Err(NotecastError::AudioProcessing(format!(
                "segment {} has sample rate {} Hz, expected {} Hz",
                segment.index, rate, sample_rate
            )));
        }

        if position > 0 && silence_ms > 0 {
            let silence_samples = (sample_rate as u64 * silence_ms / 1000) as usize;
            samples.resize(samples.len() + silence_samples, 0.0);
        }

        chapters.push(ChapterMark {
            index: segment.index,
            start_secs: duration_secs(samples.len(), sample_rate),
            title: segment
                .label
                .clone()
                .unwrap_or_else(|| format!("Part {}", segment.index + 1)),
        });
        segment_durations.push(duration_secs(pcm.len(), sample_rate));
        samples.extend_from_slice(&pcm);
    }

    let track = AssembledTrack {
        samples,
        sample_rate,
        chapters,
        segment_durations,
    };
    log::info!(
        "assembled track: {:.1}s at {} Hz, {} chapter(s)",
        track.duration_secs(),
        track.sample_rate,
        track.chapters.len()
    );
    Ok(track)
}
