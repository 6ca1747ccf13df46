//! Source resolution: local files and remote URLs.
//!
//! Remote fetches race a fixed 30s timer. The fetch runs on its own task, so
//! when the timer wins the request is abandoned rather than cancelled and may
//! keep running in the background until reqwest gives up on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};
use crate::types::normalize_extname;

/// Fixed timeout for remote sources.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Query parameters that carry an explicit format hint.
const FORMAT_HINT_KEYS: &[&str] = &["format", "fm"];

/// HTTP GET capability, injectable for tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the body of `url`.
    async fn get_bytes(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let fetch_err = |message: String| PipelineError::Fetch {
            url: url.to_string(),
            message,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", resp.status())));
        }

        let body = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Bytes of one resolved source plus naming hints.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub bytes: Vec<u8>,
    /// Basename including extension, if the source has one
    pub file_name: Option<String>,
    /// Extension with a leading dot (may be empty)
    pub extname: String,
}

/// Whether a reference is a remote URL.
pub fn is_url(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Escapes of these bytes survive whole-URL decoding untouched.
const DECODE_RESERVED: &[u8] = b";/?:@&=+$,#";

/// Whether decoding `url` as a whole would change it.
///
/// Escapes of reserved characters (such as `%2F`) do not count. A `%` that
/// does not start a valid escape does, so undecodable URLs are left alone.
pub fn is_url_encoded(url: &str) -> bool {
    let bytes = url.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let Some(byte) = bytes
            .get(i + 1..i + 3)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        else {
            return true;
        };
        // Any non-ASCII escape either decodes or fails to decode.
        if !byte.is_ascii() || !DECODE_RESERVED.contains(&byte) {
            return true;
        }
        i += 3;
    }
    false
}

/// Percent-encode a URL, keeping reserved and unreserved characters.
///
/// Already-encoded URLs are returned unchanged.
pub fn encode_url(url: &str) -> String {
    if is_url_encoded(url) {
        return url.to_string();
    }
    let mut out = String::with_capacity(url.len());
    for byte in url.bytes() {
        let keep = byte.is_ascii_alphanumeric() || b";,/?:@&=+$-_.!~*'()#".contains(&byte);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Percent-encode one path component (`/` is encoded too).
pub fn encode_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Split a URL into (path, query) ignoring the fragment.
fn url_path_and_query(url: &str) -> (&str, &str) {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let after_scheme = without_fragment
        .find("://")
        .map(|i| &without_fragment[i + 3..])
        .unwrap_or(without_fragment);
    let (location, query) = after_scheme.split_once('?').unwrap_or((after_scheme, ""));
    let path = location.find('/').map(|i| &location[i..]).unwrap_or("/");
    (path, query)
}

/// Basename of a URL path, if it has one.
pub fn url_file_name(url: &str) -> Option<String> {
    let (path, _) = url_path_and_query(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Extension of a URL: explicit query format hint first, then the path.
pub fn url_extname(url: &str) -> String {
    let (path, query) = url_path_and_query(url);
    let hint = query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        FORMAT_HINT_KEYS
            .contains(&key.to_ascii_lowercase().as_str())
            .then_some(value)
            .filter(|v| !v.is_empty())
    });
    if let Some(format) = hint {
        return normalize_extname(format);
    }
    let name = path.rsplit('/').next().unwrap_or("");
    path_extname(Path::new(name))
}

/// Extension of a filesystem path with a leading dot, lowercased.
pub fn path_extname(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_extname(&ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Fetch a URL, racing the fetch against `timeout`.
///
/// The fetch is spawned so a timeout only drops our interest in it.
pub async fn fetch_with_timeout(
    fetcher: Arc<dyn Fetcher>,
    url: &str,
    timeout: Duration,
) -> PipelineResult<SourceFile> {
    let owned = url.to_string();
    let request = encode_url(url);
    let handle = tokio::spawn(async move { fetcher.get_bytes(&request).await });

    let bytes = match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_err)) => {
            return Err(PipelineError::Fetch {
                url: owned,
                message: join_err.to_string(),
            })
        }
        Err(_) => {
            tracing::warn!("request {} timeout", owned);
            return Err(PipelineError::Timeout {
                url: owned,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    Ok(SourceFile {
        bytes,
        file_name: url_file_name(url),
        extname: url_extname(url),
    })
}

/// Read a local file.
pub async fn read_file(path: &Path) -> PipelineResult<SourceFile> {
    let bytes = tokio::fs::read(path).await.map_err(|e| PipelineError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(SourceFile {
        bytes,
        file_name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        extname: path_extname(path),
    })
}

/// Resolve any reference: URLs through the fetcher, everything else from disk.
pub async fn resolve_source(
    fetcher: Arc<dyn Fetcher>,
    reference: &str,
    timeout: Duration,
) -> PipelineResult<SourceFile> {
    if is_url(reference) {
        fetch_with_timeout(fetcher, reference, timeout).await
    } else {
        read_file(&PathBuf::from(reference)).await
    }
}
