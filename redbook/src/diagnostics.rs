//! Best-effort frame captures at flow milestones.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::driver::Driver;

/// Prefix of capture file names. Asset loading skips files carrying it.
pub const CAPTURE_PREFIX: &str = "debug_";

/// Writes numbered captures (`debug_01_navigated.png`, ...) into a run
/// directory.
///
/// Capture failures are logged at debug level and otherwise ignored; a
/// recorder without a directory does nothing.
#[derive(Debug, Default)]
pub struct DiagnosticRecorder {
    dir: Option<PathBuf>,
    counter: AtomicUsize,
}

impl DiagnosticRecorder {
    /// Records into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            counter: AtomicUsize::new(0),
        }
    }

    /// A recorder that never captures.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns the capture directory.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Captures the current frame under the next number.
    ///
    /// Returns the written path, or `None` when disabled or on failure.
    pub async fn capture<D: Driver + ?Sized>(&self, driver: &D, label: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = dir.join(format!("{CAPTURE_PREFIX}{n:02}_{label}.png"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            debug!(path = %path.display(), error = %e, "Could not create capture directory");
            return None;
        }
        match driver.capture_frame(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Captured frame");
                Some(path)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Frame capture failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDriver;

    #[tokio::test]
    async fn test_captures_are_numbered() {
        let root = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(root.path().join("images"));
        let driver = ScriptedDriver::new();

        let first = recorder.capture(&driver, "navigated").await.unwrap();
        let second = recorder.capture(&driver, "uploaded").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "debug_01_navigated.png");
        assert_eq!(second.file_name().unwrap(), "debug_02_uploaded.png");
        assert!(first.exists());
        assert_eq!(driver.captures(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_disabled_recorder_is_silent() {
        let driver = ScriptedDriver::new();
        assert!(DiagnosticRecorder::disabled()
            .capture(&driver, "navigated")
            .await
            .is_none());
        assert!(driver.captures().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        // The capture directory path runs through a regular file.
        let recorder = DiagnosticRecorder::new(blocker.join("images"));
        assert!(recorder
            .capture(&ScriptedDriver::new(), "navigated")
            .await
            .is_none());
    }
}
