use anyhow::{anyhow, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Reserved wrapper element: `<tool name="get_weather" .../>` carries the tool
/// identity in its `name` attribute instead of the tag name.
pub const GENERIC_CALL_TAG: &str = "tool";

/// Numeric-looking attribute values at or above this length stay strings so
/// long identifiers survive without precision loss.
const MAX_NUMERIC_LEN: usize = 16;

// The whole wire grammar: a self-closing element with quoted attributes and
// nothing else. Anything the model emits that does not match stays in the
// leftover prose.
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<([A-Za-z_][A-Za-z0-9_]*)((?:\s+[A-Za-z_][A-Za-z0-9_]*\s*=\s*(?:"[^"]*"|'[^']*'))*)\s*/>"#,
    )
    .expect("tag grammar regex must compile")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    /// JSON object, already coerced, ready for the dispatcher.
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub has_tools: bool,
    pub tool_calls: Option<Vec<ParsedToolCall>>,
    /// The reply with all recognized tag substrings removed, trimmed. This is
    /// the user-facing content of the turn and is never dropped.
    pub leftover_text: String,
}

/// Scan a block of generated text for makeshift tool invocations.
///
/// All non-overlapping tag matches are collected left to right; each is
/// decoded independently, so one malformed tag never aborts the pass.
pub fn parse_makeshift_calls(text: &str) -> ParseOutcome {
    let stamp = Utc::now().timestamp_millis();
    let mut calls: Vec<ParsedToolCall> = Vec::new();
    let mut leftover = String::new();
    let mut cursor = 0;

    for m in TAG_RE.find_iter(text) {
        leftover.push_str(&text[cursor..m.start()]);
        cursor = m.end();

        match decode_tag(m.as_str()) {
            Ok((name, args)) => {
                let arguments = serde_json::to_string(&Value::Object(args))
                    .unwrap_or_else(|_| "{}".to_string());
                calls.push(ParsedToolCall {
                    id: format!("makeshift-{}-{}", stamp, calls.len()),
                    name,
                    arguments,
                });
            }
            Err(err) => {
                warn!("Skipping malformed tool tag {:?}: {}", m.as_str(), err);
            }
        }
    }
    leftover.push_str(&text[cursor..]);

    let has_tools = !calls.is_empty();
    ParseOutcome {
        has_tools,
        tool_calls: if has_tools { Some(calls) } else { None },
        leftover_text: leftover.trim().to_string(),
    }
}

/// Decode one tag as a single-element document: tag name plus coerced
/// attribute map, with the generic wrapper unwrapped.
fn decode_tag(tag: &str) -> Result<(String, Map<String, Value>)> {
    let mut reader = Reader::from_str(tag);
    let mut buf = Vec::new();

    let element = loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(el) => break el.into_owned(),
            Event::Eof => return Err(anyhow!("no self-closing element found")),
            _ => return Err(anyhow!("not a single self-closing element")),
        }
    };

    let name = String::from_utf8_lossy(element.name().as_ref()).to_string();
    let mut args = Map::new();
    for attr in element.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        args.insert(key, coerce_attribute_value(&value));
    }

    if name == GENERIC_CALL_TAG {
        let tool_name = match args.remove("name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(anyhow!("generic call tag is missing a usable name attribute")),
        };
        debug!("Unwrapped generic call tag into tool {}", tool_name);
        return Ok((tool_name, args));
    }

    Ok((name, args))
}

/// Best-effort typing of an attribute value, independent of any declared
/// schema: structured data, then booleans, then short numerics, then the raw
/// string.
fn coerce_attribute_value(raw: &str) -> Value {
    let trimmed = raw.trim();

    let delimited = (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'));
    if delimited {
        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
            return v;
        }
        // Models frequently emit single-quoted pseudo-JSON; normalize once.
        let normalized = trimmed.replace('\'', "\"");
        if let Ok(v) = serde_json::from_str::<Value>(&normalized) {
            return v;
        }
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if trimmed.len() < MAX_NUMERIC_LEN && !trimmed.is_empty() {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                if let Some(n) = serde_json::Number::from_f64(f) {
                    return Value::Number(n);
                }
            }
        }
    }

    Value::String(raw.to_string())
}
