//! Shared font asset for text watermarks.
//!
//! Downloaded on first need into `<baseDir>/assets/`. Concurrent first needs
//! serialize on an async mutex so the file is fetched once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::fetch::{fetch_with_timeout, Fetcher, FETCH_TIMEOUT};

/// Where the shared font is downloaded from.
pub const DEFAULT_FONT_URL: &str = "https://release.piclist.cn/simhei.ttf";

/// File name of the shared font under `<baseDir>/assets`.
pub const FONT_FILE_NAME: &str = "simhei.ttf";

/// Lazily downloaded font file.
pub struct FontAsset {
    path: PathBuf,
    url: String,
    fetcher: Arc<dyn Fetcher>,
    lock: Mutex<()>,
}

impl FontAsset {
    /// Font asset stored under `<base_dir>/assets`.
    pub fn new(base_dir: &Path, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_url(base_dir, fetcher, DEFAULT_FONT_URL)
    }

    pub fn with_url(base_dir: &Path, fetcher: Arc<dyn Fetcher>, url: impl Into<String>) -> Self {
        Self {
            path: base_dir.join("assets").join(FONT_FILE_NAME),
            url: url.into(),
            fetcher,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the font exists locally. Returns `false` if it could not be
    /// downloaded.
    pub async fn ensure(&self) -> bool {
        if self.exists().await {
            return true;
        }
        let _guard = self.lock.lock().await;
        if self.exists().await {
            return true;
        }

        tracing::info!("Download ttf file.");
        match self.download().await {
            Ok(()) => {
                tracing::info!("Download ttf file success.");
                true
            }
            Err(e) => {
                tracing::error!("Download ttf file failed: {}", e);
                false
            }
        }
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn download(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }
        let source = fetch_with_timeout(self.fetcher.clone(), &self.url, FETCH_TIMEOUT)
            .await
            .map_err(|e| e.to_string())?;

        // Write under a temporary name so a half-written file never counts as present.
        let partial = self.path.with_extension("ttf.part");
        tokio::fs::write(&partial, &source.bytes)
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for FontAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontAsset")
            .field("path", &self.path)
            .field("url", &self.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, PipelineResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockFetcher {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn get_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if self.fail {
                Err(PipelineError::Fetch {
                    url: url.to_string(),
                    message: "unreachable".to_string(),
                })
            } else {
                Ok(b"font-bytes".to_vec())
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_need_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let asset = Arc::new(FontAsset::new(dir.path(), fetcher.clone()));

        let (a, b) = tokio::join!(asset.ensure(), asset.ensure());
        assert!(a && b);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(asset.path()).unwrap(), b"font-bytes");

        assert!(asset.ensure().await);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_failure_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let asset = FontAsset::new(dir.path(), fetcher);

        assert!(!asset.ensure().await);
        assert!(!asset.path().exists());
    }
}
