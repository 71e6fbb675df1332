//! Persistent browser identity.

use std::path::{Path, PathBuf};

/// Handle to the persistent identity store (cookies, local storage) shared by
/// both engines across runs.
///
/// The engines never clear or rotate it; only an interactive login changes
/// the authentication state it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    user_data_dir: PathBuf,
}

impl SessionProfile {
    /// Creates a profile handle for a user-data directory.
    #[must_use]
    pub fn new(user_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_data_dir: user_data_dir.into(),
        }
    }

    /// Returns the user-data directory.
    #[must_use]
    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    /// Creates the directory if missing.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.user_data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_exists_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let profile = SessionProfile::new(root.path().join("user_data"));
        assert!(!profile.user_data_dir().exists());

        profile.ensure_exists().unwrap();
        assert!(profile.user_data_dir().is_dir());

        // Second call leaves existing state alone.
        std::fs::write(profile.user_data_dir().join("Cookies"), b"x").unwrap();
        profile.ensure_exists().unwrap();
        assert!(profile.user_data_dir().join("Cookies").exists());
    }
}
