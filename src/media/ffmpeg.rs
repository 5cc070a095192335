//! Location and invocation of the external audio engine.
//!
//! Transcoding and packaging delegate to ffmpeg; durations are read
//! through ffprobe. Both tools are looked up in PATH once and verified
//! before the pipeline starts so a missing installation surfaces as a
//! configuration error, not a mid-run failure.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use tokio::process::Command as TokioCommand;

use crate::error::{NotecastError, Result};

static FFMPEG_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ffmpeg version (\d+\.\d+(?:\.\d+)?)").unwrap());

/// Located and version-checked ffmpeg/ffprobe pair
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    /// Find ffmpeg and ffprobe in PATH and verify the ffmpeg version.
    pub fn locate() -> Result<Self> {
        let ffmpeg = which::which("ffmpeg").map_err(|_| missing_tool("ffmpeg"))?;
        let ffprobe = which::which("ffprobe").map_err(|_| missing_tool("ffprobe"))?;
        log::info!("found ffmpeg at {}", ffmpeg.display());

        let min_version = Version::new(4, 0, 0);
        if let Some(version) = ffmpeg_version(&ffmpeg) {
            log::info!("ffmpeg version: {}", version);
            if version < min_version {
                return Err(NotecastError::Configuration(format!(
                    "ffmpeg {} is too old, version {} or newer is required",
                    version, min_version
                )));
            }
        } else {
            log::warn!("could not parse ffmpeg version, continuing anyway");
        }

        Ok(Self { ffmpeg, ffprobe })
    }

    /// Build from explicit paths (tests, non-PATH installations)
    pub fn with_paths(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// Run ffmpeg with the given arguments, failing with the captured
    /// stderr tail on a non-zero exit.
    pub async fn run_ffmpeg<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = TokioCommand::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotecastError::AudioProcessing(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&stderr)
            )));
        }
        Ok(())
    }

    /// Duration of an audio file in seconds, via ffprobe.
    pub async fn probe_duration<P: AsRef<Path>>(&self, path: P) -> Result<f64> {
        let output = TokioCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path.as_ref())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotecastError::AudioProcessing(format!(
                "ffprobe failed for {}: {}",
                path.as_ref().display(),
                stderr_tail(&stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<f64>().map_err(|_| {
            NotecastError::AudioProcessing(format!(
                "ffprobe returned an unparseable duration for {}: {:?}",
                path.as_ref().display(),
                stdout.trim()
            ))
        })
    }
}

fn missing_tool(name: &str) -> NotecastError {
    NotecastError::Configuration(format!(
        "{} not found in PATH. Install ffmpeg: macOS `brew install ffmpeg`, Ubuntu `sudo apt-get install ffmpeg`",
        name
    ))
}

fn ffmpeg_version(path: &Path) -> Option<Version> {
    let output = Command::new(path)
        .arg("-version")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let caps = FFMPEG_VERSION.captures(&stdout)?;
    let raw = caps.get(1)?.as_str();
    // Pad "7.1" out to "7.1.0" for semver
    let normalized = match raw.split('.').count() {
        1 => format!("{}.0.0", raw),
        2 => format!("{}.0", raw),
        _ => raw.to_string(),
    };
    Version::parse(&normalized).ok()
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail_start = lines.len().saturating_sub(4);
    lines[tail_start..].join(" | ")
}
