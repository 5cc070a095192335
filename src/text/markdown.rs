//! Markdown cleanup for speech synthesis.
//!
//! The narrative document arrives as markdown. Reading the markup aloud
//! would corrupt the narration, so heading markers, emphasis and link
//! syntax are stripped while the spoken text is kept intact.

use once_cell::sync::Lazy;
use regex::Regex;

static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}([^*]+)\*{1,3}").unwrap());
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{1,3}([^_]+)_{1,3}").unwrap());
static BACKTICKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip markdown markup, keeping the narratable text.
///
/// Heading lines lose their `#` markers but keep the heading text, so a
/// chapter title is still narrated. Images are dropped entirely, links
/// keep only their label.
pub fn clean_for_speech(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                lines.push(heading.to_string());
            }
        } else {
            lines.push(line.to_string());
        }
    }
    let mut result = lines.join("\n");

    result = IMAGE.replace_all(&result, "").into_owned();
    result = LINK.replace_all(&result, "$1").into_owned();
    result = STARS.replace_all(&result, "$1").into_owned();
    result = UNDERSCORES.replace_all(&result, "$1").into_owned();
    result = BACKTICKS.replace_all(&result, "$1").into_owned();
    result = BLANK_RUN.replace_all(&result, "\n\n").into_owned();

    result.trim().to_string()
}
