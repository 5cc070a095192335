//! M4B audiobook packaging.
//!
//! Wraps a finished audio stream into a chaptered container with
//! title/author tags and optional cover art. Chapter markers come from
//! the assembled track's recorded segment boundaries. Encoding to AAC
//! happens inside the same ffmpeg invocation, so a packaged run never
//! pays for a separate transcoding pass.

use std::io::Write;
use std::path::Path;

use chrono::Datelike;

use crate::audio::ChapterMark;
use crate::config::ContainerMetadata;
use crate::error::{NotecastError, Result};
use crate::media::ffmpeg::FfmpegTools;
use crate::media::transcode::normalize_bitrate;

/// Package audio into an `.m4b` audiobook with chapters and metadata.
///
/// Chapter timestamps must be strictly monotonic and lie inside the
/// track. The assembler guarantees this, so a violation here means the
/// caller mixed up tracks — it fails loudly instead of producing a
/// container with broken navigation.
pub async fn package<P: AsRef<Path>, Q: AsRef<Path>>(
    tools: &FfmpegTools,
    audio: P,
    metadata: &ContainerMetadata,
    chapters: &[ChapterMark],
    total_secs: f64,
    bitrate: &str,
    output: Q,
) -> Result<()> {
    let audio = audio.as_ref();
    let output = output.as_ref();

    validate_chapters(chapters, total_secs)?;
    let bitrate = normalize_bitrate(bitrate).map_err(|e| NotecastError::Packaging(e.to_string()))?;

    // ffmpeg reads chapter markers and tags from an FFMETADATA1 file
    let mut metadata_file = tempfile::NamedTempFile::new()?;
    metadata_file.write_all(generate_ffmetadata(metadata, chapters, total_secs).as_bytes())?;
    metadata_file.flush()?;

    let cover = metadata.cover.as_ref().filter(|path| {
        let exists = path.exists();
        if !exists {
            log::warn!("cover image not found, packaging without it: {}", path.display());
        }
        exists
    });

    let audio_arg = audio.to_string_lossy().into_owned();
    let metadata_arg = metadata_file.path().to_string_lossy().into_owned();
    let tmp = output.with_extension("tmp");
    let tmp_arg = tmp.to_string_lossy().into_owned();

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        audio_arg,
        "-i".into(),
        metadata_arg,
    ];
    if let Some(cover) = cover {
        log::info!("embedding cover image: {}", cover.display());
        args.extend([
            "-i".into(),
            cover.to_string_lossy().into_owned(),
            "-map".into(),
            "0:a".into(),
            "-map".into(),
            "2:v".into(),
            "-c:v".into(),
            "copy".into(),
            "-disposition:v".into(),
            "attached_pic".into(),
        ]);
    } else {
        args.extend(["-map".into(), "0:a".into()]);
    }
    args.extend([
        "-map_metadata".into(),
        "1".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        bitrate,
        "-f".into(),
        "ipod".into(),
        tmp_arg,
    ]);

    log::info!(
        "packaging {} chapter(s) into {}",
        chapters.len(),
        output.display()
    );

    match tools.run_ffmpeg(&args).await {
        Ok(()) => {
            tokio::fs::rename(&tmp, output).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(NotecastError::Packaging(e.to_string()))
        }
    }
}

/// Consistency check for chapter marks: strictly monotonic starts, all
/// inside the track. Not expected to trigger in normal operation.
fn validate_chapters(chapters: &[ChapterMark], total_secs: f64) -> Result<()> {
    let mut previous: Option<f64> = None;
    for chapter in chapters {
        if chapter.start_secs >= total_secs {
            return Err(NotecastError::Packaging(format!(
                "chapter {:?} starts at {:.3}s, beyond track duration {:.3}s",
                chapter.title, chapter.start_secs, total_secs
            )));
        }
        if let Some(prev) = previous {
            if chapter.start_secs <= prev {
                return Err(NotecastError::Packaging(format!(
                    "chapter {:?} start {:.3}s is not after the previous chapter at {:.3}s",
                    chapter.title, chapter.start_secs, prev
                )));
            }
        }
        previous = Some(chapter.start_secs);
    }
    Ok(())
}

/// Generate the FFMETADATA1 document with tags and chapter blocks.
fn generate_ffmetadata(
    metadata: &ContainerMetadata,
    chapters: &[ChapterMark],
    total_secs: f64,
) -> String {
    let mut content = vec![";FFMETADATA1".to_string()];
    if !metadata.title.is_empty() {
        content.push(format!("title={}", escape_metadata(&metadata.title)));
    }
    if !metadata.author.is_empty() {
        content.push(format!("artist={}", escape_metadata(&metadata.author)));
        content.push(format!("album_artist={}", escape_metadata(&metadata.author)));
    }
    let album = if metadata.title.is_empty() {
        "Audiobook"
    } else {
        metadata.title.as_str()
    };
    content.push(format!("album={}", escape_metadata(album)));
    content.push("genre=Audiobook".to_string());
    content.push(format!("date={}", chrono::Utc::now().year()));
    content.push(String::new());

    let total_ms = (total_secs * 1000.0).round() as u64;
    for (i, chapter) in chapters.iter().enumerate() {
        let start_ms = (chapter.start_secs * 1000.0).round() as u64;
        let end_ms = chapters
            .get(i + 1)
            .map(|next| (next.start_secs * 1000.0).round() as u64)
            .unwrap_or(total_ms);
        content.push("[CHAPTER]".to_string());
        content.push("TIMEBASE=1/1000".to_string());
        content.push(format!("START={}", start_ms));
        content.push(format!("END={}", end_ms));
        content.push(format!("title={}", escape_metadata(&chapter.title)));
        content.push(String::new());
    }

    content.join("\n")
}

// FFMETADATA treats '=', ';', '#', '\' and newline specially
fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<ChapterMark> {
        vec![
            ChapterMark {
                index: 0,
                start_secs: 0.0,
                title: "Part 1".into(),
            },
            ChapterMark {
                index: 1,
                start_secs: 10.5,
                title: "Part 2".into(),
            },
            ChapterMark {
                index: 2,
                start_secs: 19.0,
                title: "Part 3".into(),
            },
        ]
    }

    #[test]
    fn test_ffmetadata_shape() {
        let metadata = ContainerMetadata {
            title: "My Book".into(),
            author: "Jane Doe".into(),
            cover: None,
        };
        let doc = generate_ffmetadata(&metadata, &chapters(), 31.0);

        assert!(doc.starts_with(";FFMETADATA1"));
        assert!(doc.contains("title=My Book"));
        assert!(doc.contains("artist=Jane Doe"));
        assert!(doc.contains("album_artist=Jane Doe"));
        assert!(doc.contains("album=My Book"));
        assert!(doc.contains("genre=Audiobook"));
        assert_eq!(doc.matches("[CHAPTER]").count(), 3);
        assert!(doc.contains("TIMEBASE=1/1000"));
        assert!(doc.contains("START=10500"));
        assert!(doc.contains("END=19000"));
        // Last chapter ends at the track end
        assert!(doc.contains("END=31000"));
    }

    #[test]
    fn test_metadata_escaping() {
        assert_eq!(escape_metadata("a=b;c#d\\e"), "a\\=b\\;c\\#d\\\\e");
        assert_eq!(escape_metadata("plain title"), "plain title");
    }

    #[test]
    fn test_non_monotonic_chapters_rejected() {
        let mut marks = chapters();
        marks[2].start_secs = 5.0;
        assert!(matches!(
            validate_chapters(&marks, 31.0),
            Err(NotecastError::Packaging(_))
        ));
    }

    #[test]
    fn test_chapter_beyond_duration_rejected() {
        let marks = chapters();
        assert!(matches!(
            validate_chapters(&marks, 15.0),
            Err(NotecastError::Packaging(_))
        ));
        assert!(validate_chapters(&marks, 31.0).is_ok());
    }
}
