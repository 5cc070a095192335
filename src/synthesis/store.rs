//! Persisted segment storage keyed by chunk index.
//!
//! Generalizes the "file already exists on disk" resume check into a
//! keyed store so the same orchestrator logic works against a local
//! directory or an in-memory store in tests.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

/// Keyed store for synthesized audio segments.
///
/// Writes are per-index and therefore non-conflicting across concurrent
/// workers; a previously persisted segment is never mutated in place.
pub trait SegmentStore: Send + Sync {
    /// Whether a segment for this index is already persisted
    fn contains(&self, index: usize) -> bool;

    /// Persist the segment bytes for this index
    fn put(&self, index: usize, bytes: &[u8]) -> Result<()>;

    /// Read back the segment bytes for this index
    fn get(&self, index: usize) -> Result<Vec<u8>>;

    /// Indices of all persisted segments, sorted ascending
    fn indices(&self) -> Result<Vec<usize>>;
}

static SEGMENT_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^segment_(\d+)\.\w+$").unwrap());

/// Directory-backed store: one file per segment, deterministically named
/// by zero-padded index so a directory listing sorts in playback order.
pub struct DirStore {
    dir: PathBuf,
    extension: String,
}

impl DirStore {
    /// Открывает (и при необходимости создает) директорию сегментов
    pub fn new<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            extension: extension.to_string(),
        })
    }

    /// Deterministic path for a segment index
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("segment_{:04}.{}", index, self.extension))
    }
}

impl SegmentStore for DirStore {
    fn contains(&self, index: usize) -> bool {
        // A zero-byte file is a crashed write, not a usable segment
        fs::metadata(self.segment_path(index))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn put(&self, index: usize, bytes: &[u8]) -> Result<()> {
        let target = self.segment_path(index);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        log::debug!("persisted segment {} to {}", index, target.display());
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Vec<u8>> {
        Ok(fs::read(self.segment_path(index))?)
    }

    fn indices(&self) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(caps) = name.to_str().and_then(|n| SEGMENT_FILE.captures(n)) {
                if let Ok(index) = caps[1].parse::<usize>() {
                    indices.push(index);
                }
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

/// In-memory store for tests
#[derive(Default)]
pub struct MemStore {
    segments: Mutex<HashMap<usize, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentStore for MemStore {
    fn contains(&self, index: usize) -> bool {
        self.segments.lock().unwrap().contains_key(&index)
    }

    fn put(&self, index: usize, bytes: &[u8]) -> Result<()> {
        self.segments.lock().unwrap().insert(index, bytes.to_vec());
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Vec<u8>> {
        self.segments
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .ok_or_else(|| crate::error::NotecastError::MissingSegment(index))
    }

    fn indices(&self) -> Result<Vec<usize>> {
        let mut indices: Vec<usize> = self.segments.lock().unwrap().keys().copied().collect();
        indices.sort_unstable();
        Ok(indices)
    }
}
