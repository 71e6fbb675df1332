//! Note records.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::RedbookError;

/// Prefix of scheme-relative URLs.
const SCHEME_RELATIVE: &str = "//";

/// Normalizes a raw image URL list.
///
/// Scheme-relative entries are rewritten to `https:` first, so an entry and
/// its scheme-relative twin collapse into one. Empty entries are dropped and
/// first-seen order is kept. Normalizing an already normalized list is a
/// no-op.
pub fn normalize_image_urls<I, S>(urls: I) -> IndexSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|url| {
            let url = url.as_ref().trim();
            if url.is_empty() {
                None
            } else if url.starts_with(SCHEME_RELATIVE) {
                Some(format!("https:{url}"))
            } else {
                Some(url.to_string())
            }
        })
        .collect()
}

/// An unnormalized note candidate produced by one acquisition strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteCandidate {
    /// Note title.
    pub title: String,
    /// Note body text.
    pub description: String,
    /// Topic tags, in page order.
    pub tags: Vec<String>,
    /// Image URLs as found on the page.
    pub image_urls: Vec<String>,
}

impl NoteCandidate {
    /// Whether the candidate carries a non-blank title.
    #[must_use]
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Whether the candidate carries at least one image.
    #[must_use]
    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }
}

/// The normalized result of one extraction run.
///
/// Built once from a merged candidate and never mutated afterwards.
/// Deserializing goes through the same normalization as construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NoteCandidate")]
pub struct NoteContent {
    title: String,
    description: String,
    tags: Vec<String>,
    image_urls: IndexSet<String>,
}

impl From<NoteCandidate> for NoteContent {
    fn from(candidate: NoteCandidate) -> Self {
        Self {
            title: candidate.title,
            description: candidate.description,
            tags: candidate.tags,
            image_urls: normalize_image_urls(candidate.image_urls),
        }
    }
}

impl NoteContent {
    /// Creates an empty record, the terminal state of a fully degraded run.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the normalized image URLs in first-seen order.
    #[must_use]
    pub fn image_urls(&self) -> &IndexSet<String> {
        &self.image_urls
    }

    /// Whether nothing usable was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.description.is_empty()
            && self.tags.is_empty()
            && self.image_urls.is_empty()
    }
}

/// Provenance of a persisted note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    /// The address the note was extracted from.
    pub url: String,
    /// When the extraction finished.
    pub timestamp: DateTime<Utc>,
}

/// The persisted extraction artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDocument {
    /// Provenance.
    pub meta: NoteMeta,
    /// The extracted note.
    pub data: NoteContent,
}

impl NoteDocument {
    /// Wraps a note with the current time.
    #[must_use]
    pub fn new(url: impl Into<String>, data: NoteContent) -> Self {
        Self {
            meta: NoteMeta {
                url: url.into(),
                timestamp: Utc::now(),
            },
            data,
        }
    }

    /// Writes the document as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), RedbookError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a document back.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, RedbookError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scheme_relative_and_secure_collapse() {
        let urls = normalize_image_urls(["//cdn.site/a.jpg", "https://cdn.site/a.jpg"]);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls.first().map(String::as_str), Some("https://cdn.site/a.jpg"));
    }

    #[test]
    fn test_normalize_keeps_first_seen_order() {
        let urls = normalize_image_urls([
            "https://cdn.site/b.jpg",
            "//cdn.site/a.jpg",
            "https://cdn.site/b.jpg",
            "",
            "http://cdn.site/c.jpg",
        ]);
        let urls: Vec<_> = urls.into_iter().collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.site/b.jpg".to_string(),
                "https://cdn.site/a.jpg".to_string(),
                "http://cdn.site/c.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_image_urls(["//a/1.png", "//a/2.png", "https://a/1.png"]);
        let twice = normalize_image_urls(once.iter());
        assert_eq!(once, twice);
        assert!(twice.iter().all(|u| !u.starts_with("//")));
    }

    #[test]
    fn test_content_from_candidate_normalizes() {
        let content = NoteContent::from(NoteCandidate {
            title: "Shapes".to_string(),
            description: "desc".to_string(),
            tags: vec!["math".to_string()],
            image_urls: vec!["//img/1.jpg".to_string(), "https://img/1.jpg".to_string()],
        });
        assert_eq!(content.title(), "Shapes");
        assert_eq!(content.image_urls().len(), 1);
        assert!(!content.is_empty());
    }

    #[test]
    fn test_deserialize_renormalizes() {
        let json = r#"{"title":"t","description":"","tags":[],"image_urls":["//x/a.png","https://x/a.png"]}"#;
        let content: NoteContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.image_urls().len(), 1);
    }

    #[test]
    fn test_empty_content() {
        let content = NoteContent::empty();
        assert!(content.is_empty());
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "", "description": "", "tags": [], "image_urls": []})
        );
    }

    #[test]
    fn test_document_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task").join("01_raw.json");
        let doc = NoteDocument::new(
            "https://example.com/explore/1",
            NoteContent::from(NoteCandidate {
                title: "Hello".to_string(),
                ..Default::default()
            }),
        );

        doc.write_to(&path).unwrap();
        let back = NoteDocument::read_from(&path).unwrap();
        assert_eq!(back, doc);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["meta"]["url"], "https://example.com/explore/1");
        assert_eq!(raw["data"]["title"], "Hello");
    }
}
