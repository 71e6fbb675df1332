//! # Redbook
//!
//! Extraction and publication engines for note pages served behind an
//! unstable, login-walled web UI.
//!
//! Both engines drive a live browser page through the [`driver::Driver`]
//! capability and degrade through ordered chains of strategies instead of
//! failing outright:
//!
//! - **Extraction**: reads a note's title, description, tags and images from
//!   the embedded page state, falling back to the rendered DOM and finally to
//!   the static markup.
//! - **Publication**: uploads an ordered asset list into the creator form,
//!   recovers from session loss by waiting for a manual login, and fills the
//!   title and body. The form is never submitted; a human confirms it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use redbook::prelude::*;
//!
//! let config = RedbookConfig::from_path("redbook.toml")?;
//! let profile = SessionProfile::new("./user_data");
//! let driver = ChromiumDriver::launch(&config.driver, &profile).await?;
//!
//! let engine = ExtractionEngine::new(&driver, config.extraction.clone(), config.session.clone())?;
//! let note = engine.extract("https://www.xiaohongshu.com/explore/...").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assets;
pub mod cancellation;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod errors;
pub mod extraction;
pub mod models;
pub mod publication;
pub mod session;
pub mod strategy;
pub mod testing;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assets::AssetList;
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        DriverConfig, ExtractionConfig, PublicationConfig, RedbookConfig, SessionMarkers,
    };
    pub use crate::diagnostics::DiagnosticRecorder;
    pub use crate::driver::{Driver, FileDialog, ReadyCondition, SessionProfile};
    #[cfg(feature = "chromium")]
    pub use crate::driver::ChromiumDriver;
    pub use crate::errors::{
        ConfigError, DriverError, ExtractionError, FailureKind, PublishError, RedbookError,
    };
    pub use crate::extraction::{ExtractionEngine, ExtractionReport};
    pub use crate::models::{
        Draft, NoteContent, NoteDocument, PublicationResult, UploadFailure, UploadOutcome,
        UploadReason,
    };
    pub use crate::publication::PublicationEngine;
    pub use crate::session::{PageSignals, SessionClassifier, SessionState};
    pub use crate::workspace::TaskWorkspace;
}
