//! # notecast
//!
//! Turns a narrative text document into a narrated audiobook: splits the
//! text into bounded-size chunks along sentence and paragraph boundaries,
//! synthesizes each chunk through a pluggable TTS provider with retry and
//! resume, stitches the audio segments into one continuous track with
//! silence gaps, and optionally transcodes and packages the result into a
//! chaptered M4B container with metadata and cover art.
//!
//! ```rust,ignore
//! use notecast::{Notecast, PipelineConfig, ProviderKind};
//!
//! let config = PipelineConfig {
//!     provider: ProviderKind::OpenAi,
//!     api_key: std::env::var("OPENAI_API_KEY")?,
//!     voice: "nova".to_string(),
//!     package_m4b: true,
//!     ..PipelineConfig::default()
//! };
//!
//! let pipeline = Notecast::new(config);
//! let report = pipeline.run(&narrative_text, workdir).await?;
//! println!("audiobook: {:?}", report.outputs.last());
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod synthesis;
pub mod text;
pub mod tts;

pub use audio::{assemble, AssembledTrack, AudioSegment, ChapterMark};
pub use config::{
    ChunkingConfig, ContainerMetadata, OutputFormat, PipelineConfig, ProviderKind, RetryConfig,
};
pub use error::{FailedChunk, NotecastError, Result};
pub use pipeline::{Notecast, PipelineReport};
pub use progress::ProgressUpdate;
pub use synthesis::{DirStore, JobStatus, MemStore, SegmentStore, SynthesisJob};
pub use text::{clean_for_speech, split, Chunk};
pub use tts::{create_backend, SegmentFormat, TtsBackend};
