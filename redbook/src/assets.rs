//! Ordered image assets handed to the publish form.

use std::path::{Path, PathBuf};

use crate::diagnostics::CAPTURE_PREFIX;
use crate::errors::PublishError;

/// File extensions accepted as publishable images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// A non-empty, ordered list of image files.
///
/// The order is the order the site shows the images in, so directory
/// listings are sorted by file name (`page_01.png`, `page_02.png`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetList {
    paths: Vec<PathBuf>,
}

impl AssetList {
    /// Wraps an explicit list, keeping its order.
    pub fn new(paths: Vec<PathBuf>) -> Result<Self, PublishError> {
        if paths.is_empty() {
            return Err(PublishError::NoAssets { location: None });
        }
        Ok(Self { paths })
    }

    /// Loads every image in `dir`, sorted by file name.
    ///
    /// Only `png`, `jpg`, `jpeg` and `webp` files count (any case); frame
    /// captures left by earlier runs are skipped. A missing directory is the
    /// same as an empty one.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, PublishError> {
        let dir = dir.as_ref();
        let no_assets = || PublishError::NoAssets {
            location: Some(dir.display().to_string()),
        };

        let Ok(entries) = std::fs::read_dir(dir) else {
            return Err(no_assets());
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_publishable(path))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if paths.is_empty() {
            return Err(no_assets());
        }
        Ok(Self { paths })
    }

    /// Returns the paths in upload order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Returns the number of assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if the list holds no paths, which construction rules out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn is_publishable(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    !name.starts_with(CAPTURE_PREFIX)
        && IMAGE_EXTENSIONS
            .iter()
            .any(|ext| extension.eq_ignore_ascii_case(ext))
}
