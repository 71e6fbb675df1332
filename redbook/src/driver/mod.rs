//! UI automation driver capability.
//!
//! The engines only see the [`Driver`] trait: navigation, script
//! evaluation, bounded waits, a one-shot file dialog interception and frame
//! captures. No wire protocol is assumed; the Chromium implementation lives
//! behind the `chromium` feature.

mod profile;
mod protocols;

#[cfg(feature = "chromium")]
mod chromium;

pub use profile::SessionProfile;
pub use protocols::{evaluate_as, Driver, FileDialog, ReadyCondition};

#[cfg(feature = "chromium")]
pub use chromium::ChromiumDriver;
