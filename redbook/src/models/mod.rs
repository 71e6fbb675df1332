//! Data records produced and consumed by the engines.
//!
//! This module provides:
//! - The normalized note record and its persisted document form
//! - The publication draft
//! - Upload attempt outcomes and the publication result

mod draft;
mod note;
mod upload;

pub use draft::Draft;
pub use note::{normalize_image_urls, NoteCandidate, NoteContent, NoteDocument, NoteMeta};
pub use upload::{PublicationResult, UploadFailure, UploadOutcome, UploadReason};
