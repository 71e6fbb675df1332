//! Error types for the redbook engines.
//!
//! Each layer gets its own enum: the driver reports transport and page
//! failures, the engines translate the ones that matter into their own
//! terminal errors, and [`RedbookError`] wraps everything for callers that
//! don't care which layer failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::UploadReason;

/// The main error type for redbook operations.
#[derive(Debug, Error)]
pub enum RedbookError {
    /// The extraction engine failed.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    /// The publication engine failed.
    #[error("{0}")]
    Publish(#[from] PublishError),

    /// The automation driver failed outside an engine.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`crate::driver::Driver`] implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The page could not be reached or loaded.
    #[error("Navigation to '{address}' failed: {message}")]
    Navigation {
        /// The address being loaded.
        address: String,
        /// The underlying failure.
        message: String,
    },

    /// A bounded wait elapsed.
    #[error("Timed out after {}ms waiting for {operation}", after.as_millis())]
    Timeout {
        /// What was being waited for.
        operation: String,
        /// The bound that elapsed.
        after: Duration,
    },

    /// A page script threw or returned something unusable.
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// The native file dialog could not be intercepted or answered.
    #[error("File dialog error: {0}")]
    Dialog(String),

    /// The browser connection is gone.
    #[error("Browser session closed")]
    Closed,

    /// The browser could not be launched or attached.
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Any other DevTools protocol failure.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error (frame captures, profile directories).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether this error is a bounded wait elapsing.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Terminal failures of the extraction engine.
///
/// Everything else (missing state blob, failed DOM script, no title) degrades
/// into an emptier [`crate::models::NoteContent`] instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The page was never reached.
    #[error("Could not load note page '{address}': {message}")]
    Navigation {
        /// The requested address.
        address: String,
        /// The underlying failure.
        message: String,
    },

    /// The page never finished loading within the navigation bound.
    #[error("Note page '{address}' did not load within {}s", after.as_secs())]
    Timeout {
        /// The requested address.
        address: String,
        /// The navigation bound.
        after: Duration,
    },

    /// The operator aborted while the engine waited for a manual login.
    #[error("Extraction cancelled: {0}")]
    Cancelled(String),
}

impl ExtractionError {
    /// Maps a navigation failure from the driver.
    #[must_use]
    pub fn from_navigation(address: &str, err: DriverError) -> Self {
        match err {
            DriverError::Timeout { after, .. } => Self::Timeout {
                address: address.to_string(),
                after,
            },
            other => Self::Navigation {
                address: address.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Terminal failures of the publication engine.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The publish page could not be loaded.
    #[error("Could not open publish page '{address}': {message}")]
    Navigation {
        /// The publish address.
        address: String,
        /// The underlying failure.
        message: String,
    },

    /// The asset list was empty.
    #[error("No publishable images found{}", location.as_ref().map(|l| format!(" in {l}")).unwrap_or_default())]
    NoAssets {
        /// The directory that was scanned, if any.
        location: Option<String>,
    },

    /// Every upload attempt failed.
    #[error("Upload failed after {attempts} attempt(s), last reason: {last_reason}")]
    UploadExhausted {
        /// Attempts made.
        attempts: usize,
        /// Reason reported by the final attempt.
        last_reason: UploadReason,
    },

    /// The operator aborted while the engine waited for a manual login.
    #[error("Publication cancelled: {0}")]
    Cancelled(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Could not read config '{path}': {source}")]
    Io {
        /// The path that was read.
        path: String,
        /// The IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the schema.
    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A state-blob pattern is not a valid regex.
    #[error("Invalid state pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex compiler message.
        message: String,
    },

    /// A value is outside its allowed range.
    #[error("Invalid config value for '{field}': {message}")]
    Invalid {
        /// The field path.
        field: String,
        /// Why it was rejected.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure taxonomy shared by both engines, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The page was never reached. Fatal.
    NavigationFailure,
    /// No strategy yielded usable data. The result is degraded, not an error.
    ExtractionAmbiguous,
    /// The session expired mid-operation. Recovered via manual login.
    SessionExpired,
    /// No selector strategy located an element.
    TargetNotFound,
    /// The native file dialog never appeared.
    DialogTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NavigationFailure => write!(f, "navigation_failure"),
            Self::ExtractionAmbiguous => write!(f, "extraction_ambiguous"),
            Self::SessionExpired => write!(f, "session_expired"),
            Self::TargetNotFound => write!(f, "target_not_found"),
            Self::DialogTimeout => write!(f, "dialog_timeout"),
        }
    }
}

/// Result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
