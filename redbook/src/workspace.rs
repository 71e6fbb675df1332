//! Per-task working directories.
//!
//! Each task owns `<root>/<task_id>/` holding the extracted note, the
//! planned draft and the rendered images:
//!
//! ```text
//! workspace/auto_20250114_0930/
//! ├── 01_raw.json
//! ├── 02_draft.json
//! └── images/
//! ```

use chrono::{DateTime, Local, TimeZone};
use std::path::{Path, PathBuf};

/// File name of the extracted note document.
pub const RAW_NOTE_FILE: &str = "01_raw.json";
/// File name of the planned draft.
pub const DRAFT_FILE: &str = "02_draft.json";
/// Directory name of the rendered images.
pub const IMAGES_DIR: &str = "images";

/// Builds a task id from a timestamp: `auto_YYYYMMDD_HHMM`.
#[must_use]
pub fn task_id_at<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("auto_{}", at.format("%Y%m%d_%H%M"))
}

/// Builds a task id from the local time.
#[must_use]
pub fn generate_task_id() -> String {
    task_id_at(&Local::now())
}

/// The working directory of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkspace {
    root: PathBuf,
    task_id: String,
}

impl TaskWorkspace {
    /// Opens a task under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, task_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            task_id: task_id.into(),
        }
    }

    /// Opens a task with a generated id.
    #[must_use]
    pub fn generated(root: impl Into<PathBuf>) -> Self {
        Self::new(root, generate_task_id())
    }

    /// Returns the task id.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns the task directory.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.task_id)
    }

    /// Returns the extracted note path.
    #[must_use]
    pub fn raw_note_path(&self) -> PathBuf {
        self.dir().join(RAW_NOTE_FILE)
    }

    /// Returns the draft path.
    #[must_use]
    pub fn draft_path(&self) -> PathBuf {
        self.dir().join(DRAFT_FILE)
    }

    /// Returns the images directory.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.dir().join(IMAGES_DIR)
    }

    /// Creates the task and images directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.images_dir())
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_task_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 14, 9, 30, 59).unwrap();
        assert_eq!(task_id_at(&at), "auto_20250114_0930");
        assert!(generate_task_id().starts_with("auto_"));
    }

    #[test]
    fn test_layout() {
        let root = tempfile::tempdir().unwrap();
        let task = TaskWorkspace::new(root.path(), "auto_20250114_0930");

        assert_eq!(
            task.raw_note_path(),
            root.path().join("auto_20250114_0930").join("01_raw.json")
        );
        assert_eq!(
            task.draft_path(),
            root.path().join("auto_20250114_0930/02_draft.json")
        );

        task.ensure_dirs().unwrap();
        assert!(task.images_dir().is_dir());
        assert_eq!(task.task_id(), "auto_20250114_0930");
        assert_eq!(task.root(), root.path());
    }
}
