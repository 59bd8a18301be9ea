use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::platform::ChannelContext;

// Internal-thought spans; some models misclose the tag with a backslash.
static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?(</think>|<\\think>)").expect("think regex"));

static NULL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<NULL>\s*$").expect("null regex"));

// Segments that platforms render standalone: fenced math blocks and image
// markdown. Everything else travels as plain prose.
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```math.*?```|!\[[^\]]*\]\([^)\s]+\)").expect("segment regex")
});

/// Remove internal-thought spans, logging what was hidden.
pub fn strip_think(text: &str) -> String {
    if THINK_RE.is_match(text) {
        for span in THINK_RE.find_iter(text) {
            debug!("Stripping internal reasoning span ({} chars)", span.as_str().len());
        }
    }
    THINK_RE.replace_all(text, "").to_string()
}

/// Final scrub before anything reaches the recipient: drop thought spans and
/// a trailing `<NULL>` marker, then trim.
pub fn sanitize_reply(text: &str) -> String {
    let stripped = strip_think(text);
    NULL_RE.replace(stripped.trim(), "").trim().to_string()
}

/// Split a reply so special inline segments go out as separate sends.
pub fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for m in SEGMENT_RE.find_iter(text) {
        let before = text[cursor..m.start()].trim();
        if !before.is_empty() {
            segments.push(before.to_string());
        }
        segments.push(m.as_str().to_string());
        cursor = m.end();
    }
    let rest = text[cursor..].trim();
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

/// Sanitize and send a reply over the channel; empty or `<NULL>` replies are
/// suppressed rather than sent blank.
pub async fn deliver(ctx: &dyn ChannelContext, reply: &str) -> Result<()> {
    let sanitized = sanitize_reply(reply);
    if sanitized.is_empty() {
        debug!("Suppressing empty reply");
        return Ok(());
    }
    for segment in split_segments(&sanitized) {
        ctx.send_text(&segment).await?;
    }
    Ok(())
}
