//! Pipeline driver.
//!
//! Wires the stages together: markdown cleanup → chunking → synthesis →
//! assembly → optional transcoding → optional M4B packaging. Each stage
//! is independently callable; intermediate artifacts (segment files, the
//! assembled WAV) live in the work directory, which makes an interrupted
//! run resumable from where it stopped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use crate::audio::{assemble, AssembledTrack, AudioSegment};
use crate::config::PipelineConfig;
use crate::error::{FailedChunk, NotecastError, Result};
use crate::media::{package, transcode, FfmpegTools};
use crate::progress::{send_progress, ProgressUpdate};
use crate::synthesis::{DirStore, JobStatus, SynthesisJob};
use crate::text::{clean_for_speech, split, Chunk};
use crate::tts::{create_backend, TtsBackend};

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    /// Number of chunks produced from the document
    pub chunks: usize,
    /// Terminal synthesis status per chunk index
    pub jobs: BTreeMap<usize, SynthesisJob>,
    /// Duration of the assembled track, seconds
    pub track_duration_secs: f64,
    /// Files produced by the run, in creation order
    pub outputs: Vec<PathBuf>,
}

impl PipelineReport {
    /// Chunks that ended Failed, with excerpt and attempt count
    pub fn failures(&self) -> Vec<&SynthesisJob> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed)
            .collect()
    }
}

/// Основная структура для работы с конвейером
pub struct Notecast {
    config: PipelineConfig,
    progress: Option<Sender<ProgressUpdate>>,
}

impl Notecast {
    /// Создать новый экземпляр с указанной конфигурацией
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Создать экземпляр с отправителем прогресса
    pub fn with_progress(config: PipelineConfig, sender: Sender<ProgressUpdate>) -> Self {
        Self {
            config,
            progress: Some(sender),
        }
    }

    /// Run the full pipeline on a narrative document.
    ///
    /// Segment files land in `workdir/segments/`, the assembled track in
    /// `workdir/book.wav`, optional transcodes and the M4B next to it.
    pub async fn run(&self, text: &str, workdir: &Path) -> Result<PipelineReport> {
        let backend: Arc<dyn TtsBackend> = Arc::from(create_backend(&self.config)?);
        self.run_with_backend(text, workdir, backend).await
    }

    /// Like [`run`](Self::run), with an explicit backend. Lets tests and
    /// embedders drive the pipeline against their own synthesis.
    pub async fn run_with_backend(
        &self,
        text: &str,
        workdir: &Path,
        backend: Arc<dyn TtsBackend>,
    ) -> Result<PipelineReport> {
        send_progress(&self.progress, ProgressUpdate::Started).await;
        let result = self.run_inner(text, workdir, backend).await;
        match &result {
            Ok(_) => send_progress(&self.progress, ProgressUpdate::Finished).await,
            Err(e) => send_progress(&self.progress, ProgressUpdate::Error(e.to_string())).await,
        }
        result
    }

    async fn run_inner(
        &self,
        text: &str,
        workdir: &Path,
        backend: Arc<dyn TtsBackend>,
    ) -> Result<PipelineReport> {
        if self.config.chunking.max_chunk_size > backend.max_input_chars() {
            log::warn!(
                "max_chunk_size {} exceeds the {} ceiling of {} chars; oversized chunks will fail",
                self.config.chunking.max_chunk_size,
                backend.name(),
                backend.max_input_chars()
            );
        }

        // 1. Chunking; errors here are fatal to the run
        let chunks = self.chunk(text)?;
        send_progress(&self.progress, ProgressUpdate::Chunked { total: chunks.len() }).await;
        log::info!("document split into {} chunk(s)", chunks.len());

        // 2. Per-chunk synthesis, resumable through the segment store
        let store = Arc::new(DirStore::new(
            workdir.join("segments"),
            backend.segment_format().extension(),
        )?);
        let jobs = crate::synthesis::run(
            &chunks,
            backend,
            store.clone(),
            &self.config.retry,
            self.config.max_concurrent_requests,
            &self.progress,
        )
        .await;

        // 3. Refuse to ship audio with gaps unless explicitly allowed
        let failed = collect_failures(&chunks, &jobs);
        if !failed.is_empty() && !self.config.allow_partial {
            return Err(NotecastError::PartialSynthesis { failed });
        }

        let segments = self.collect_segments(&chunks, &jobs, store.as_ref());

        // 4. Assembly
        send_progress(&self.progress, ProgressUpdate::Assembling).await;
        let track = assemble(&segments, self.config.silence_ms)?;
        let wav_path = workdir.join("book.wav");
        track.write_wav(&wav_path)?;
        let mut outputs = vec![wav_path.clone()];

        // 5. Optional transcode / packaging, both through ffmpeg
        if self.config.transcode_to.is_some() || self.config.package_m4b {
            let tools = FfmpegTools::locate()?;
            if let Some(format) = self.config.transcode_to {
                send_progress(&self.progress, ProgressUpdate::Transcoding).await;
                let out = workdir.join(format!("book.{}", format.extension()));
                transcode(&tools, &wav_path, &out, format, self.config.bitrate.as_deref()).await?;
                outputs.push(out);
            }
            if self.config.package_m4b {
                send_progress(&self.progress, ProgressUpdate::Packaging).await;
                let out = workdir.join("book.m4b");
                self.package_track(&tools, &wav_path, &track, &out).await?;
                outputs.push(out);
            }
        }

        Ok(PipelineReport {
            chunks: chunks.len(),
            jobs,
            track_duration_secs: track.duration_secs(),
            outputs,
        })
    }

    /// Clean and chunk the document per the configured limits
    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>> {
        if self.config.chunking.clean_markdown {
            let cleaned = clean_for_speech(text);
            split(&cleaned, &self.config.chunking)
        } else {
            split(text, &self.config.chunking)
        }
    }

    /// Package an assembled track into an M4B next to the WAV
    async fn package_track(
        &self,
        tools: &FfmpegTools,
        wav_path: &Path,
        track: &AssembledTrack,
        output: &Path,
    ) -> Result<()> {
        package(
            tools,
            wav_path,
            &self.config.metadata,
            &track.chapters,
            track.duration_secs(),
            &self.config.m4b_bitrate,
            output,
        )
        .await
    }

    // Succeeded segments in index order. With partial assembly the gaps
    // collapse: segments are re-indexed by rank while chapter labels keep
    // the original part numbers, so the report stays truthful.
    fn collect_segments(
        &self,
        chunks: &[Chunk],
        jobs: &BTreeMap<usize, SynthesisJob>,
        store: &DirStore,
    ) -> Vec<AudioSegment> {
        let mut segments = Vec::new();
        for chunk in chunks {
            if jobs
                .get(&chunk.index)
                .map(|j| j.status == JobStatus::Succeeded)
                .unwrap_or(false)
            {
                let rank = segments.len();
                let mut segment = AudioSegment::new(rank, store.segment_path(chunk.index));
                segment.label = Some(format!("Part {}", chunk.index + 1));
                segments.push(segment);
            }
        }
        segments
    }
}

fn collect_failures(chunks: &[Chunk], jobs: &BTreeMap<usize, SynthesisJob>) -> Vec<FailedChunk> {
    let mut failed = Vec::new();
    for chunk in chunks {
        if let Some(job) = jobs.get(&chunk.index) {
            if job.status == JobStatus::Failed {
                failed.push(FailedChunk {
                    index: chunk.index,
                    excerpt: excerpt(&chunk.text),
                    error: job
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                    attempts: job.attempts,
                });
            }
        }
    }
    failed
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 60;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::Result;
    use crate::tts::SegmentFormat;
    use async_trait::async_trait;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const TEXT: &str = "The first paragraph tells the beginning of the story in a single long breath of prose. It keeps going for a while to pass the minimum chunk size comfortably and then some.\n\nThe second paragraph carries the middle of the tale with just as much enthusiasm as the first. It also continues long enough to stand on its own as a chunk of narration.\n\nThe third paragraph wraps everything up neatly and says goodbye to the listener. It closes the book with a calm, measured final sentence.";

    fn wav_bytes(seconds: f64) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..(seconds * 8000.0) as usize {
                writer.write_sample(0.25f32).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// Backend that renders every chunk as half a second of WAV
    struct WavBackend {
        calls: AtomicUsize,
        fail_texts: Mutex<Vec<String>>,
    }

    impl WavBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_texts: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(text: &str) -> Self {
            let backend = Self::ok();
            backend.fail_texts.lock().unwrap().push(text.to_string());
            backend
        }
    }

    #[async_trait]
    impl TtsBackend for WavBackend {
        fn name(&self) -> &'static str {
            "wav-mock"
        }
        fn max_input_chars(&self) -> usize {
            4096
        }
        fn segment_format(&self) -> SegmentFormat {
            SegmentFormat::Wav
        }
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_texts.lock().unwrap().iter().any(|t| text.contains(t)) {
                return Err(NotecastError::PermanentSynthesis("scripted failure".into()));
            }
            Ok(wav_bytes(0.5))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            api_key: "unused".to_string(),
            chunking: crate::config::ChunkingConfig {
                max_chunk_size: 300,
                min_chunk_size: 100,
                clean_markdown: true,
            },
            retry: RetryConfig {
                max_attempts: 2,
                backoff_base_ms: 1,
                backoff_multiplier: 1.0,
            },
            silence_ms: 250,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_full_run_produces_wav_and_report() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let pipeline = Notecast::new(config());
        let backend = Arc::new(WavBackend::ok());

        let report = pipeline
            .run_with_backend(TEXT, dir.path(), backend.clone())
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert!(report.failures().is_empty());
        assert!(report.outputs[0].ends_with("book.wav"));
        assert!(report.outputs[0].exists());
        // 3 segments of 0.5s plus two 250ms silences
        assert!((report.track_duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rerun_is_free_and_identical() {
        let dir = tempdir().unwrap();
        let pipeline = Notecast::new(config());
        let backend = Arc::new(WavBackend::ok());

        let first = pipeline
            .run_with_backend(TEXT, dir.path(), backend.clone())
            .await
            .unwrap();
        let calls_after_first = backend.calls.load(Ordering::SeqCst);

        let second = pipeline
            .run_with_backend(TEXT, dir.path(), backend.clone())
            .await
            .unwrap();

        // No additional provider calls, same terminal statuses
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(first.jobs.len(), second.jobs.len());
        for (index, job) in &second.jobs {
            assert_eq!(job.status, first.jobs[index].status);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_refused_by_default() {
        let dir = tempdir().unwrap();
        let pipeline = Notecast::new(config());
        let backend = Arc::new(WavBackend::failing_on("second paragraph"));

        let err = pipeline
            .run_with_backend(TEXT, dir.path(), backend)
            .await
            .unwrap_err();

        match err {
            NotecastError::PartialSynthesis { failed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].index, 1);
                assert_eq!(failed[0].attempts, 1);
                assert!(failed[0].excerpt.starts_with("The second paragraph"));
            }
            other => panic!("expected PartialSynthesis, got {:?}", other),
        }
        // Succeeded segments survive for a resumed attempt
        assert!(dir.path().join("segments").join("segment_0000.wav").exists());
        assert!(dir.path().join("segments").join("segment_0002.wav").exists());
    }

    #[tokio::test]
    async fn test_partial_assembly_when_opted_in() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.allow_partial = true;
        let pipeline = Notecast::new(cfg);
        let backend = Arc::new(WavBackend::failing_on("second paragraph"));

        let report = pipeline
            .run_with_backend(TEXT, dir.path(), backend)
            .await
            .unwrap();

        assert_eq!(report.failures().len(), 1);
        // Two segments of 0.5s and one silence gap
        assert!((report.track_duration_secs - 1.25).abs() < 1e-9);
        assert!(report.outputs[0].exists());
    }

    #[tokio::test]
    async fn test_empty_document_is_fatal() {
        let dir = tempdir().unwrap();
        let pipeline = Notecast::new(config());
        let backend = Arc::new(WavBackend::ok());

        let err = pipeline
            .run_with_backend("   \n\n  ", dir.path(), backend)
            .await
            .unwrap_err();
        assert!(matches!(err, NotecastError::EmptyDocument));
    }

    #[test]
    fn test_excerpt_truncation() {
        let short = "Short text.";
        assert_eq!(excerpt(short), short);
        let long = "x".repeat(100);
        let cut = excerpt(&long);
        assert!(cut.chars().count() <= 61);
        assert!(cut.ends_with('…'));
    }
}
