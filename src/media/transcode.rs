//! Re-encoding of assembled audio to a target codec and bitrate.
//!
//! A thin, stateless wrapper around ffmpeg. The destination is never
//! partially overwritten: encoding goes to a temporary sibling path that
//! is atomically renamed into place only on success.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::OutputFormat;
use crate::error::{NotecastError, Result};
use crate::media::ffmpeg::FfmpegTools;

static BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+k$").unwrap());

/// Normalize a bitrate string: bare digits get a `k` suffix, anything
/// that still does not look like `NNNk` is rejected.
pub fn normalize_bitrate(bitrate: &str) -> Result<String> {
    let bitrate = bitrate.trim().to_lowercase();
    let normalized = if bitrate.chars().all(|c| c.is_ascii_digit()) && !bitrate.is_empty() {
        format!("{}k", bitrate)
    } else {
        bitrate
    };
    if !BITRATE.is_match(&normalized) {
        return Err(NotecastError::Transcode(format!(
            "invalid bitrate {:?}, expected e.g. \"192k\" or \"192\"",
            normalized
        )));
    }
    Ok(normalized)
}

/// Re-encode `input` into `output` with the given format and bitrate.
///
/// `bitrate` defaults to the format's standard bitrate (320k for mp3,
/// 256k for aac) when not provided.
pub async fn transcode<P: AsRef<Path>, Q: AsRef<Path>>(
    tools: &FfmpegTools,
    input: P,
    output: Q,
    format: OutputFormat,
    bitrate: Option<&str>,
) -> Result<()> {
    let input = input.as_ref();
    let output = output.as_ref();
    if !input.exists() {
        return Err(NotecastError::Transcode(format!(
            "input file not found: {}",
            input.display()
        )));
    }
    let bitrate = normalize_bitrate(bitrate.unwrap_or_else(|| format.default_bitrate()))?;

    // ffmpeg infers the container from the extension, so the temp file
    // gets an explicit -f instead
    let container = match format {
        OutputFormat::Mp3 => "mp3",
        OutputFormat::Aac => "ipod",
    };
    let tmp = output.with_extension("tmp");

    log::info!(
        "transcoding {} -> {} ({} @ {})",
        input.display(),
        output.display(),
        format.extension(),
        bitrate
    );

    let input_arg = input.to_string_lossy().into_owned();
    let tmp_arg = tmp.to_string_lossy().into_owned();
    let result = tools
        .run_ffmpeg([
            "-y",
            "-i",
            input_arg.as_str(),
            "-vn",
            "-c:a",
            format.codec(),
            "-b:a",
            bitrate.as_str(),
            "-f",
            container,
            tmp_arg.as_str(),
        ])
        .await;

    match result {
        Ok(()) => {
            tokio::fs::rename(&tmp, output).await?;
            Ok(())
        }
        Err(e) => {
            // Keep the destination untouched on failure
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(NotecastError::Transcode(e.to_string()))
        }
    }
}
