//! Expands directory arguments into image files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::fetch::is_url;

/// Extensions picked up when walking a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "ico", "svg", "avif", "heic",
    "heif",
];

/// Finds image files under directories.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    follow_links: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self { follow_links: true }
    }

    /// Expand one CLI argument.
    ///
    /// URLs and plain files pass through as-is (the pipeline decides what to
    /// do with them); directories expand to their supported files, sorted.
    pub fn expand(&self, reference: &str) -> Vec<String> {
        if is_url(reference) {
            return vec![reference.to_string()];
        }
        let path = Path::new(reference);
        if !path.is_dir() {
            return vec![reference.to_string()];
        }
        self.discover(path)
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    /// Expand many arguments, keeping argument order.
    pub fn expand_all<I, S>(&self, references: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        references
            .into_iter()
            .flat_map(|r| self.expand(r.as_ref()))
            .collect()
    }

    /// All supported files under `dir`, sorted by path.
    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a path has a supported image extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}
