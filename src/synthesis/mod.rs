// Synthesis orchestration module
// Drives chunked text through a TTS backend with bounded concurrency,
// retry with exponential backoff, and resumable per-index persistence

pub mod store;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::sync::mpsc::Sender;
use tokio::sync::Semaphore;

use crate::config::RetryConfig;
use crate::progress::{send_progress, ProgressUpdate};
use crate::text::Chunk;
use crate::tts::TtsBackend;

pub use store::{DirStore, MemStore, SegmentStore};

/// Terminal state of one chunk's synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Per-chunk synthesis outcome
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    /// Index of the source chunk
    pub chunk_index: usize,
    /// How many synthesis attempts were made (0 if resumed from storage)
    pub attempts: u32,
    /// Terminal status
    pub status: JobStatus,
    /// Last error message, if any attempt failed
    pub last_error: Option<String>,
}

/// Synthesize every chunk through the backend, persisting each segment
/// to the store as soon as it succeeds.
///
/// Chunks are dispatched concurrently up to `max_concurrent` in-flight
/// requests. A chunk whose segment already exists in the store is
/// skipped without any provider call, which makes re-runs after a crash
/// free. One chunk's failure never aborts the others: the full pass
/// always completes and every chunk ends up Succeeded or Failed in the
/// returned map.
pub async fn run(
    chunks: &[Chunk],
    backend: Arc<dyn TtsBackend>,
    store: Arc<dyn SegmentStore>,
    retry: &RetryConfig,
    max_concurrent: usize,
    progress: &Option<Sender<ProgressUpdate>>,
) -> BTreeMap<usize, SynthesisJob> {
    let total = chunks.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::with_capacity(total);
    for chunk in chunks.iter().cloned() {
        let backend = backend.clone();
        let store = store.clone();
        let retry = retry.clone();
        let semaphore = semaphore.clone();
        let completed = completed.clone();
        let progress = progress.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let job = synthesize_chunk(&chunk, backend.as_ref(), store.as_ref(), &retry).await;
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            send_progress(
                &progress,
                ProgressUpdate::Synthesis {
                    completed: done,
                    total,
                },
            )
            .await;
            job
        }));
    }

    let mut jobs = BTreeMap::new();
    for (position, result) in join_all(tasks).await.into_iter().enumerate() {
        let job = result.unwrap_or_else(|e| SynthesisJob {
            chunk_index: chunks[position].index,
            attempts: 0,
            status: JobStatus::Failed,
            last_error: Some(format!("synthesis task panicked: {}", e)),
        });
        jobs.insert(job.chunk_index, job);
    }

    let failed = jobs.values().filter(|j| j.status == JobStatus::Failed).count();
    if failed > 0 {
        log::warn!("synthesis finished with {}/{} failed chunk(s)", failed, total);
    } else {
        log::info!("synthesis finished: {} chunk(s) succeeded", total);
    }
    jobs
}

/// Synthesize one chunk, retrying transient failures with exponential
/// backoff. Permanent failures are terminal on the first occurrence.
async fn synthesize_chunk(
    chunk: &Chunk,
    backend: &dyn TtsBackend,
    store: &dyn SegmentStore,
    retry: &RetryConfig,
) -> SynthesisJob {
    if store.contains(chunk.index) {
        log::info!("segment {} already persisted, skipping synthesis", chunk.index);
        return SynthesisJob {
            chunk_index: chunk.index,
            attempts: 0,
            status: JobStatus::Succeeded,
            last_error: None,
        };
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        log::info!(
            "synthesizing chunk {} ({} chars, attempt {}/{})",
            chunk.index,
            chunk.char_count(),
            attempts,
            retry.max_attempts
        );

        match backend.synthesize(&chunk.text).await {
            Ok(bytes) => match store.put(chunk.index, &bytes) {
                Ok(()) => {
                    return SynthesisJob {
                        chunk_index: chunk.index,
                        attempts,
                        status: JobStatus::Succeeded,
                        last_error: None,
                    };
                }
                Err(e) => {
                    log::error!("failed to persist segment {}: {}", chunk.index, e);
                    return SynthesisJob {
                        chunk_index: chunk.index,
                        attempts,
                        status: JobStatus::Failed,
                        last_error: Some(e.to_string()),
                    };
                }
            },
            Err(e) if e.is_transient() && attempts < retry.max_attempts => {
                let delay = retry.delay_ms(attempts) + jitter_ms();
                log::warn!(
                    "transient error on chunk {}: {}; retrying in {} ms",
                    chunk.index,
                    e,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                let terminal = if e.is_transient() {
                    "retry budget exhausted"
                } else {
                    "not retryable"
                };
                log::error!("chunk {} failed ({}): {}", chunk.index, terminal, e);
                return SynthesisJob {
                    chunk_index: chunk.index,
                    attempts,
                    status: JobStatus::Failed,
                    last_error: Some(e.to_string()),
                };
            }
        }
    }
}

// Small uniform jitter so concurrent retries against a rate-limited
// provider do not stampede in lockstep.
fn jitter_ms() -> u64 {
    rand::thread_rng().gen_range(0..250)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NotecastError, Result};
    use crate::tts::SegmentFormat;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|index| Chunk {
                index,
                text: format!("Sentence number {}.", index),
            })
            .collect()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_multiplier: 1.0,
        }
    }

    /// Mock backend scripted with per-text failure counts
    struct MockBackend {
        calls: AtomicUsize,
        // text -> remaining failures before success, and whether transient
        failures: Mutex<HashMap<String, (usize, bool)>>,
    }

    impl MockBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: Mutex::new(HashMap::new()),
            }
        }

        fn failing(text: &str, times: usize, transient: bool) -> Self {
            let backend = Self::ok();
            backend
                .failures
                .lock()
                .unwrap()
                .insert(text.to_string(), (times, transient));
            backend
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TtsBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn max_input_chars(&self) -> usize {
            4096
        }

        fn segment_format(&self) -> SegmentFormat {
            SegmentFormat::Mp3
        }

        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures.lock().unwrap();
            if let Some((remaining, transient)) = failures.get_mut(text) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return if *transient {
                        Err(NotecastError::TransientSynthesis("rate limited".into()))
                    } else {
                        Err(NotecastError::PermanentSynthesis("invalid voice".into()))
                    };
                }
            }
            Ok(format!("audio:{}", text).into_bytes())
        }
    }

    #[tokio::test]
    async fn test_all_chunks_succeed_and_persist() {
        let backend = Arc::new(MockBackend::ok());
        let store = Arc::new(MemStore::new());
        let chunks = chunks(5);

        let jobs = run(&chunks, backend.clone(), store.clone(), &fast_retry(), 2, &None).await;

        assert_eq!(jobs.len(), 5);
        for (index, job) in &jobs {
            assert_eq!(job.status, JobStatus::Succeeded);
            assert_eq!(job.attempts, 1);
            assert!(store.contains(*index));
        }
        assert_eq!(backend.call_count(), 5);
    }

    #[tokio::test]
    async fn test_resume_skips_persisted_segments() {
        let backend = Arc::new(MockBackend::ok());
        let store = Arc::new(MemStore::new());
        let chunks = chunks(4);
        for chunk in &chunks {
            store.put(chunk.index, b"already there").unwrap();
        }

        let jobs = run(&chunks, backend.clone(), store.clone(), &fast_retry(), 2, &None).await;

        // Zero provider calls, identical terminal statuses
        assert_eq!(backend.call_count(), 0);
        for job in jobs.values() {
            assert_eq!(job.status, JobStatus::Succeeded);
            assert_eq!(job.attempts, 0);
        }

        // Running again must be just as free
        let again = run(&chunks, backend.clone(), store, &fast_retry(), 2, &None).await;
        assert_eq!(backend.call_count(), 0);
        for (index, job) in &again {
            assert_eq!(job.status, jobs[index].status);
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retried_to_success() {
        let chunks = chunks(6);
        let backend = Arc::new(MockBackend::failing(&chunks[4].text, 1, true));
        let store = Arc::new(MemStore::new());

        let jobs = run(&chunks, backend, store.clone(), &fast_retry(), 3, &None).await;

        let job = &jobs[&4];
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 2);
        assert!(store.contains(4));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let chunks = chunks(2);
        let backend = Arc::new(MockBackend::failing(&chunks[1].text, usize::MAX, false));
        let store = Arc::new(MemStore::new());

        let jobs = run(&chunks, backend.clone(), store, &fast_retry(), 2, &None).await;

        let job = &jobs[&1];
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.as_deref().unwrap().contains("invalid voice"));
        // chunk 0 once, chunk 1 once — no retry on permanent errors
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_without_aborting_others() {
        let chunks = chunks(5);
        let backend = Arc::new(MockBackend::failing(&chunks[2].text, usize::MAX, true));
        let store = Arc::new(MemStore::new());
        let retry = fast_retry();

        let jobs = run(&chunks, backend, store.clone(), &retry, 2, &None).await;

        assert_eq!(jobs[&2].status, JobStatus::Failed);
        assert_eq!(jobs[&2].attempts, retry.max_attempts);
        for index in [0, 1, 3, 4] {
            assert_eq!(jobs[&index].status, JobStatus::Succeeded, "chunk {}", index);
            assert!(store.contains(index));
        }
        assert!(!store.contains(2));
    }

    #[tokio::test]
    async fn test_progress_reports_every_completion() {
        let backend = Arc::new(MockBackend::ok());
        let store = Arc::new(MemStore::new());
        let chunks = chunks(3);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);

        run(&chunks, backend, store, &fast_retry(), 2, &Some(tx)).await;

        let mut seen = 0;
        while let Ok(update) = rx.try_recv() {
            if let ProgressUpdate::Synthesis { total, .. } = update {
                assert_eq!(total, 3);
                seen += 1;
            }
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn test_chunk_too_large_is_terminal() {
        let store = Arc::new(MemStore::new());
        let oversized = Chunk {
            index: 0,
            text: "a".repeat(5000),
        };

        struct LimitBackend;
        #[async_trait]
        impl TtsBackend for LimitBackend {
            fn name(&self) -> &'static str {
                "limit"
            }
            fn max_input_chars(&self) -> usize {
                4096
            }
            fn segment_format(&self) -> SegmentFormat {
                SegmentFormat::Mp3
            }
            async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
                crate::tts::ensure_within_limit(text, self.max_input_chars())?;
                Ok(vec![1])
            }
        }

        let jobs = run(
            &[oversized],
            Arc::new(LimitBackend),
            store,
            &fast_retry(),
            1,
            &None,
        )
        .await;
        let job = &jobs[&0];
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.as_deref().unwrap().contains("exceeds provider limit"));
    }
}
