//! Structured-state acquisition.
//!
//! Note pages embed their initial application state as a JSON-like object
//! literal in an inline script. The literal is located with ordered regex
//! patterns, repaired into valid JSON and searched for the first node shaped
//! like a note.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

use crate::errors::ConfigError;
use crate::models::NoteCandidate;

/// Image fields in order of preference.
const IMAGE_FIELDS: [&str; 3] = ["urlOriginal", "urlDefault", "url"];

/// Why no structured candidate came out of the markup.
#[derive(Debug, Error)]
pub enum StateError {
    /// No pattern matched.
    #[error("no embedded state found")]
    NotFound,
    /// The blob was found but is not valid JSON even after repair.
    #[error("embedded state is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The blob parsed but holds no note-shaped node.
    #[error("embedded state holds no note")]
    NoNote,
}

/// A candidate read from the embedded state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredNote {
    /// The note fields.
    pub candidate: NoteCandidate,
    /// Whether more than one note-shaped node was present.
    pub ambiguous: bool,
}

/// Locates and parses the embedded state blob.
#[derive(Debug, Clone)]
pub struct StateParser {
    patterns: Vec<Regex>,
}

impl StateParser {
    /// Compiles the patterns. Each must capture the blob in group 1.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns the blob captured by the first matching pattern.
    #[must_use]
    pub fn locate<'a>(&self, markup: &'a str) -> Option<&'a str> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(markup)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
                .filter(|blob| !blob.trim().is_empty())
        })
    }

    /// Parses the embedded state and reads the first note out of it.
    pub fn parse(&self, markup: &str) -> Result<StructuredNote, StateError> {
        let blob = self.locate(markup).ok_or(StateError::NotFound)?;
        let state: Value = serde_json::from_str(&repair_undefined(blob))?;
        let node = find_note_node(&state).ok_or(StateError::NoNote)?;
        Ok(StructuredNote {
            candidate: candidate_from_node(node),
            ambiguous: count_note_nodes(&state, 2) > 1,
        })
    }
}

const UNDEFINED: &str = "undefined";

/// Rewrites bare `undefined` values to `null`.
///
/// Only tokens outside string literals that follow `:`, `[` or `,` are
/// touched; prose inside strings is left alone.
#[must_use]
pub fn repair_undefined(raw: &str) -> Cow<'_, str> {
    let bytes = raw.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_token = b' ';
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
                last_token = b'"';
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b.is_ascii_whitespace() => {}
            b'u' if matches!(last_token, b':' | b'[' | b',')
                && raw[i..].starts_with(UNDEFINED)
                && !bytes
                    .get(i + UNDEFINED.len())
                    .is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_' || *next == b'$') =>
            {
                let buf = out.get_or_insert_with(|| String::with_capacity(raw.len()));
                buf.push_str(&raw[copied..i]);
                buf.push_str("null");
                i += UNDEFINED.len();
                copied = i;
                last_token = b'l';
                continue;
            }
            _ => last_token = b,
        }
        i += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&raw[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(raw),
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn is_note_node(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("title")
            && obj.contains_key("desc")
            && obj.get("imageList").is_some_and(Value::is_array)
    })
}

/// Finds the first note-shaped node, depth-first in document order.
///
/// A node is note-shaped when it has `title` and `desc` keys and an array
/// `imageList`, wherever it sits in the tree.
#[must_use]
pub fn find_note_node(value: &Value) -> Option<&Value> {
    if is_note_node(value) {
        return Some(value);
    }
    match value {
        Value::Object(map) => map.values().find_map(find_note_node),
        Value::Array(items) => items.iter().find_map(find_note_node),
        _ => None,
    }
}

/// Counts note-shaped nodes, stopping at `limit`.
///
/// Nodes nested inside a note node are not counted separately.
#[must_use]
pub fn count_note_nodes(value: &Value, limit: usize) -> usize {
    fn walk(value: &Value, limit: usize, found: &mut usize) {
        if *found >= limit {
            return;
        }
        if is_note_node(value) {
            *found += 1;
            return;
        }
        match value {
            Value::Object(map) => map.values().for_each(|v| walk(v, limit, found)),
            Value::Array(items) => items.iter().for_each(|v| walk(v, limit, found)),
            _ => {}
        }
    }

    let mut found = 0;
    walk(value, limit, &mut found);
    found
}

fn text_field(node: &Value, key: &str) -> String {
    node.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Reads the note fields out of a note-shaped node.
///
/// Tags come from `tagList[].name`. Each image takes the first non-empty
/// of `urlOriginal`, `urlDefault` and `url`; images with none are dropped.
#[must_use]
pub fn candidate_from_node(node: &Value) -> NoteCandidate {
    let tags = node
        .get("tagList")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let image_urls = node
        .get("imageList")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| {
                    IMAGE_FIELDS.iter().find_map(|field| {
                        image
                            .get(*field)
                            .and_then(Value::as_str)
                            .filter(|url| !url.is_empty())
                    })
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    NoteCandidate {
        title: text_field(node, "title"),
        description: text_field(node, "desc"),
        tags,
        image_urls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::testing::{image_entry, note_state, page_with_state};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parser() -> StateParser {
        StateParser::new(&ExtractionConfig::default().state_patterns).unwrap()
    }

    #[test]
    fn test_parse_embedded_note() {
        let state = note_state(
            "Autumn trip",
            "Three days in Kyoto",
            &["travel", "kyoto"],
            &[
                image_entry("//sns-img.xhscdn.com/a.jpg"),
                image_entry("https://sns-img.xhscdn.com/b.jpg"),
            ],
        );
        let markup = page_with_state(&state.to_string());

        let note = parser().parse(&markup).unwrap();
        assert!(!note.ambiguous);
        assert_eq!(
            note.candidate,
            NoteCandidate {
                title: "Autumn trip".to_string(),
                description: "Three days in Kyoto".to_string(),
                tags: vec!["travel".to_string(), "kyoto".to_string()],
                image_urls: vec![
                    "//sns-img.xhscdn.com/a.jpg".to_string(),
                    "https://sns-img.xhscdn.com/b.jpg".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_undefined_values_are_repaired() {
        let raw = r#"{"a":undefined,"b":[undefined, 1],"c":{"d": undefined},"e":"not undefined"}"#;
        let repaired = repair_undefined(raw);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(
            value,
            json!({"a": null, "b": [null, 1], "c": {"d": null}, "e": "not undefined"})
        );
    }

    #[test]
    fn test_undefined_inside_strings_is_kept() {
        let raw = r#"{"desc":"left it blank, undefined on purpose","tags":["[undefined]", "a:undefined"],"q":"say \"x\", undefined","v":undefined}"#;
        let value: Value = serde_json::from_str(&repair_undefined(raw)).unwrap();
        assert_eq!(
            value,
            json!({
                "desc": "left it blank, undefined on purpose",
                "tags": ["[undefined]", "a:undefined"],
                "q": "say \"x\", undefined",
                "v": null
            })
        );
    }

    #[test]
    fn test_repair_borrows_when_nothing_changes() {
        let raw = r#"{"undefinedCount":1,"x":[1,2]}"#;
        assert!(matches!(repair_undefined(raw), Cow::Borrowed(_)));
        assert!(matches!(repair_undefined(r#"{"x":undefinedish}"#), Cow::Borrowed(_)));
    }

    #[test]
    fn test_site_markup_with_undefined() {
        let raw = r#"{"user":{"id":undefined},"note":{"noteDetailMap":{"x":{"note":{"title":"T","desc":"D","imageList":[{"urlDefault":"http://ci.xiaohongshu.com/1"}],"video":undefined}}}}}"#;
        let note = parser().parse(&page_with_state(raw)).unwrap();
        assert_eq!(note.candidate.title, "T");
        assert_eq!(note.candidate.image_urls, vec!["http://ci.xiaohongshu.com/1".to_string()]);
    }

    #[test]
    fn test_image_field_preference() {
        let node = json!({
            "title": "t",
            "desc": "d",
            "imageList": [
                {"url": "u1", "urlDefault": "d1", "urlOriginal": "o1"},
                {"url": "u2", "urlDefault": ""},
                {"width": 10},
                {"urlDefault": "d4"}
            ]
        });
        assert_eq!(
            candidate_from_node(&node).image_urls,
            vec!["o1".to_string(), "u2".to_string(), "d4".to_string()]
        );
    }

    #[test]
    fn test_first_note_in_document_order() {
        let state = json!({
            "feed": { "title": "only title" },
            "first": { "title": "one", "desc": "", "imageList": [] },
            "second": { "title": "two", "desc": "", "imageList": [] }
        });
        assert_eq!(find_note_node(&state).unwrap()["title"], "one");
        assert_eq!(count_note_nodes(&state, 2), 2);
        assert_eq!(count_note_nodes(&state, 5), 2);
        assert_eq!(count_note_nodes(&json!({"x": 1}), 2), 0);

        let markup = page_with_state(&state.to_string());
        assert!(parser().parse(&markup).unwrap().ambiguous);
    }

    #[test]
    fn test_image_list_must_be_array() {
        let state = json!({ "title": "t", "desc": "d", "imageList": "nope" });
        assert!(find_note_node(&state).is_none());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parser().parse("<html><body>nothing</body></html>"),
            Err(StateError::NotFound)
        ));
        assert!(matches!(
            parser().parse(&page_with_state("{\"title\": oops}")),
            Err(StateError::Malformed(_))
        ));
        assert!(matches!(
            parser().parse(&page_with_state("{\"global\":{}}")),
            Err(StateError::NoNote)
        ));
    }

    #[test]
    fn test_later_pattern_used_when_earlier_miss() {
        let markup = "<script>var x = 1; __INITIAL_STATE__ = {\"n\":{\"title\":\"a\",\"desc\":\"b\",\"imageList\":[]}};</script>";
        let note = parser().parse(markup).unwrap();
        assert_eq!(note.candidate.title, "a");
    }
}
