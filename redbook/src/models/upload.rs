//! Upload attempt outcomes and the publication result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an upload attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadFailure {
    /// The session expired; a manual login is needed.
    LoginRedirect,
    /// The native file dialog was not intercepted or never opened.
    NoFileDialog,
    /// No element could trigger the file dialog.
    NoUploadTarget,
}

/// Flat reason code of an attempt, `None` on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    /// The attempt succeeded.
    #[default]
    None,
    /// See [`UploadFailure::LoginRedirect`].
    LoginRedirect,
    /// See [`UploadFailure::NoFileDialog`].
    NoFileDialog,
    /// See [`UploadFailure::NoUploadTarget`].
    NoUploadTarget,
}

impl From<UploadFailure> for UploadReason {
    fn from(failure: UploadFailure) -> Self {
        match failure {
            UploadFailure::LoginRedirect => Self::LoginRedirect,
            UploadFailure::NoFileDialog => Self::NoFileDialog,
            UploadFailure::NoUploadTarget => Self::NoUploadTarget,
        }
    }
}

impl fmt::Display for UploadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::LoginRedirect => write!(f, "login_redirect"),
            Self::NoFileDialog => write!(f, "no_file_dialog"),
            Self::NoUploadTarget => write!(f, "no_upload_target"),
        }
    }
}

/// Result of one upload attempt. Consumed immediately by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Files were handed to the page.
    Uploaded {
        /// Whether a thumbnail or preview element was seen afterwards.
        thumbnails_seen: bool,
    },
    /// The attempt failed.
    Failed(UploadFailure),
}

impl UploadOutcome {
    /// Whether the attempt succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    /// The flat reason code.
    #[must_use]
    pub fn reason(&self) -> UploadReason {
        match self {
            Self::Uploaded { .. } => UploadReason::None,
            Self::Failed(failure) => (*failure).into(),
        }
    }
}

/// Terminal result of a publication run.
///
/// `filled` means the form was reached and left open for human review;
/// the individual fields report best-effort form filling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationResult {
    /// Whether the upload succeeded and form filling ran.
    pub filled: bool,
    /// Whether the title field was located and written.
    pub title_filled: bool,
    /// Whether the content editor was located and written.
    pub content_filled: bool,
    /// Upload attempts made, login recoveries excluded.
    pub upload_attempts: usize,
    /// Manual logins waited for.
    pub login_recoveries: usize,
    /// Whether thumbnails were confirmed after the upload.
    pub thumbnails_seen: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_has_no_reason() {
        let outcome = UploadOutcome::Uploaded {
            thumbnails_seen: false,
        };
        assert!(outcome.success());
        assert_eq!(outcome.reason(), UploadReason::None);
    }

    #[test]
    fn test_outcome_failure_reason() {
        let outcome = UploadOutcome::Failed(UploadFailure::LoginRedirect);
        assert!(!outcome.success());
        assert_eq!(outcome.reason(), UploadReason::LoginRedirect);
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&UploadReason::NoFileDialog).unwrap();
        assert_eq!(json, "\"no_file_dialog\"");
    }
}
