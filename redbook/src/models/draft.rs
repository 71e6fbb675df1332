//! Publication draft.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::RedbookError;

/// Text payload forwarded into the publish form.
///
/// The site caps the displayed title length; the planning service is
/// responsible for that, the engine forwards the text untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Note title.
    pub title: String,
    /// Note body.
    #[serde(default)]
    pub content: String,
}

impl Draft {
    /// Creates a draft.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Loads a draft written by the planning service.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RedbookError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
