//! Asset localization: fetch remote resources once and keep them on disk.
//!
//! Every asset maps to a local file named after the last segment of its URL
//! path, inside a subdirectory of the output directory. When that file
//! already exists and caching is enabled no request is made at all, which
//! makes repeated conversions of the same document cheap and offline-safe.
//!
//! ## Failure isolation
//!
//! [`AssetStore::ensure_all`] resolves many images with bounded concurrency
//! (`buffer_unordered`). Each fetch produces its own `Result`; a failed or
//! slow image never cancels its siblings. The caller decides what a failure
//! means: the stylesheet is fatal, a content image is simply dropped.

use crate::config::ConversionConfig;
use crate::error::{AssetError, Md2HtmlError};
use crate::pipeline::paths::relative_href;
use crate::pipeline::persist::write_atomic;
use crate::progress::ProgressCallback;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// File name used for images whose URL has no usable path segment.
pub const IMAGE_FALLBACK_NAME: &str = "image.png";

/// Check if the string is an absolute http(s) URL.
pub fn is_remote_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Derive the local file name for `url`.
///
/// Uses the last path segment; falls back to `fallback` when it is empty or
/// could escape the destination directory.
pub fn derive_filename(url: &str, fallback: &str) -> Result<String, AssetError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| AssetError::InvalidUrl {
        url: url.to_string(),
    })?;
    let last = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let usable = !last.is_empty() && last != "." && last != ".." && !last.contains('\\');
    Ok(if usable {
        last.to_string()
    } else {
        fallback.to_string()
    })
}

/// Build the HTTP client shared by all fetches of a conversion.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, Md2HtmlError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("md2html-publish/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Md2HtmlError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// A remote asset available on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// Path relative to the output directory, `/`-separated.
    pub relative_path: String,
    /// Absolute location on disk.
    pub path: PathBuf,
    /// `true` when no network request was made.
    pub cached: bool,
}

/// Fetch-and-persist layer for one conversion.
pub struct AssetStore {
    client: reqwest::Client,
    root: PathBuf,
    cache_enabled: bool,
    timeout_secs: u64,
    progress: Option<ProgressCallback>,
    /// Destinations already resolved in this run.
    resolved: DashMap<PathBuf, LocalAsset>,
    requests: AtomicUsize,
    cache_hits: AtomicUsize,
    written: Mutex<Vec<PathBuf>>,
}

impl AssetStore {
    /// Create a store writing below `root` (the output directory).
    pub fn new(client: reqwest::Client, root: impl Into<PathBuf>, config: &ConversionConfig) -> Self {
        Self {
            client,
            root: root.into(),
            cache_enabled: config.cache_enabled,
            timeout_secs: config.fetch_timeout_secs,
            progress: config.progress_callback.clone(),
            resolved: DashMap::new(),
            requests: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make `url` available under `root/subdir` and return where it is.
    ///
    /// Calling this twice for the same destination is side-effect free the
    /// second time and returns the same path.
    pub async fn ensure(
        &self,
        url: &str,
        subdir: &str,
        fallback: &str,
    ) -> Result<LocalAsset, AssetError> {
        let result = self.ensure_inner(url, subdir, fallback).await;
        if let Some(ref cb) = self.progress {
            match &result {
                Ok(asset) => cb.on_asset_ready(url, asset.cached),
                Err(e) => cb.on_asset_failed(url, &e.to_string()),
            }
        }
        result
    }

    async fn ensure_inner(
        &self,
        url: &str,
        subdir: &str,
        fallback: &str,
    ) -> Result<LocalAsset, AssetError> {
        let filename = derive_filename(url, fallback)?;
        let dir = self.root.join(subdir);
        let dest = dir.join(&filename);

        if let Some(done) = self.resolved.get(&dest) {
            return Ok(LocalAsset {
                cached: true,
                ..done.value().clone()
            });
        }

        let relative_path = relative_href(&self.root, &dest);

        if self.cache_enabled && tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            debug!("Asset cache hit: {} → {}", url, dest.display());
            self.cache_hits.fetch_add(1, Ordering::SeqCst);
            let asset = LocalAsset {
                relative_path,
                path: dest.clone(),
                cached: true,
            };
            self.resolved.insert(dest, asset.clone());
            return Ok(asset);
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AssetError::Io {
                path: dir.clone(),
                detail: e.to_string(),
            })?;

        let bytes = self.fetch(url).await?;
        write_atomic(&dest, &bytes)
            .await
            .map_err(|e| AssetError::Io {
                path: dest.clone(),
                detail: e.to_string(),
            })?;
        info!("Fetched {} ({} bytes) → {}", url, bytes.len(), dest.display());

        if let Ok(mut written) = self.written.lock() {
            written.push(dest.clone());
        }
        let asset = LocalAsset {
            relative_path,
            path: dest.clone(),
            cached: false,
        };
        self.resolved.insert(dest, asset.clone());
        Ok(asset)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if !response.status().is_success() {
            return Err(AssetError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.request_error(url, e))?;
        Ok(bytes.to_vec())
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> AssetError {
        if e.is_timeout() {
            AssetError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            AssetError::Request {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }

    /// Resolve many URLs into `root/subdir`, at most `concurrency` at a time.
    ///
    /// URLs are deduplicated by derived file name before any request is
    /// dispatched; every input URL gets an entry in the returned map.
    pub async fn ensure_all(
        &self,
        urls: &[String],
        subdir: &str,
        fallback: &str,
        concurrency: usize,
    ) -> HashMap<String, Result<LocalAsset, AssetError>> {
        let mut results: HashMap<String, Result<LocalAsset, AssetError>> = HashMap::new();
        let mut owner: HashMap<String, String> = HashMap::new();
        let mut unique: Vec<(String, String)> = Vec::new();
        let mut seen_urls: HashSet<&str> = HashSet::new();

        for url in urls {
            if !seen_urls.insert(url.as_str()) {
                continue;
            }
            match derive_filename(url, fallback) {
                Ok(name) => match owner.get(&name) {
                    Some(first) => warn!(
                        "{} and {} share the local name '{}'; fetching only the first",
                        first, url, name
                    ),
                    None => {
                        owner.insert(name.clone(), url.clone());
                        unique.push((name, url.clone()));
                    }
                },
                Err(e) => {
                    results.insert(url.clone(), Err(e));
                }
            }
        }

        debug!(
            "Resolving {} assets ({} unique) with concurrency {}",
            urls.len(),
            unique.len(),
            concurrency
        );

        let by_name: HashMap<String, Result<LocalAsset, AssetError>> = stream::iter(unique)
            .map(|(name, url)| async move {
                let outcome = self.ensure(&url, subdir, fallback).await;
                (name, outcome)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for url in urls {
            if results.contains_key(url) {
                continue;
            }
            if let Ok(name) = derive_filename(url, fallback) {
                if let Some(outcome) = by_name.get(&name) {
                    results.insert(url.clone(), outcome.clone());
                }
            }
        }
        results
    }

    /// HTTP requests issued so far.
    pub fn network_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Assets served from disk without a request.
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::SeqCst)
    }

    /// Files written by this store, in completion order.
    pub fn written_files(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}
