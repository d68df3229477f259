//! Static asset origins the resolver fetches from.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::RwLock;

use crate::error::FetchError;

/// Something that can hand out the bytes behind an asset path.
///
/// Paths are `/`-separated and relative to the origin, or absolute
/// `http(s)://` URLs where the origin supports them.
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;

    /// Human readable origin description for logs.
    fn describe(&self) -> String;
}

impl<S: AssetSource> AssetSource for Arc<S> {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        (**self).fetch(path)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// The origins a viewer can be pointed at.
#[derive(Debug, Clone)]
pub enum AssetOrigin {
    /// Files under a local directory.
    Directory(PathBuf),
    /// A static web server.
    Http { client: reqwest::Client, base: String },
    /// Files held in memory.
    Memory(MemorySource),
}

impl AssetOrigin {
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self::Directory(root.into())
    }

    pub fn http(base: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base = base.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Http {
                url: base.clone(),
                message: err.to_string(),
            })?;
        Ok(Self::Http { client, base })
    }

    /// Picks an HTTP origin for `http(s)://` roots and a directory otherwise.
    pub fn from_root(root: &str, timeout: Duration) -> Result<Self, FetchError> {
        if is_url(root) {
            Self::http(root, timeout)
        } else {
            Ok(Self::directory(root))
        }
    }
}

impl AssetSource for AssetOrigin {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(FetchError::NotFound("<empty path>".into()));
        }
        match self {
            Self::Directory(root) => read_file(root, path).await,
            Self::Http { client, base } => {
                let url = if is_url(path) {
                    path.to_string()
                } else {
                    join_url(base, path)
                };
                fetch_url(client, &url).await
            }
            Self::Memory(memory) => memory.fetch(path).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Directory(root) => format!("directory {}", root.display()),
            Self::Http { base, .. } => format!("http origin {base}"),
            Self::Memory(memory) => memory.describe(),
        }
    }
}

async fn read_file(root: &Path, path: &str) -> Result<Vec<u8>, FetchError> {
    let relative = Path::new(path.trim_start_matches('/'));
    if is_url(path) || relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(FetchError::NotFound(path.to_string()));
    }
    let full = root.join(relative);
    debug!("reading {}", full.display());
    tokio::fs::read(&full).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotFound(path.to_string())
        } else {
            FetchError::Io {
                path: path.to_string(),
                source,
            }
        }
    })
}

async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let http_error = |message: String| FetchError::Http {
        url: url.to_string(),
        message,
    };
    debug!("GET {url}");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| http_error(err.to_string()))?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(http_error(format!("status {status}")));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| http_error(err.to_string()))?;
    Ok(bytes.to_vec())
}

fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Resolves `relative` against the directory of `base`, the way companion
/// files (`mtllib`, `map_Kd`) are referenced.
pub fn sibling_path(base: &str, relative: &str) -> String {
    if is_url(relative) || relative.starts_with('/') {
        return relative.to_string();
    }
    match base.rfind('/') {
        Some(index) => format!("{}/{}", &base[..index], relative),
        None => relative.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryEntry {
    bytes: Option<Arc<[u8]>>,
    delay: Duration,
}

/// In-memory origin with optional per-path latency and failures.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &Self {
        self.insert_delayed(path, bytes, Duration::ZERO)
    }

    /// Serves `bytes` after `delay`.
    pub fn insert_delayed(
        &self,
        path: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> &Self {
        let bytes: Vec<u8> = bytes.into();
        self.entries.write().insert(
            path.into(),
            MemoryEntry {
                bytes: Some(Arc::from(bytes)),
                delay,
            },
        );
        self
    }

    /// Fails with "not found" after `delay`.
    pub fn insert_failure(&self, path: impl Into<String>, delay: Duration) -> &Self {
        self.entries
            .write()
            .insert(path.into(), MemoryEntry { bytes: None, delay });
        self
    }

    /// Paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.read().clone()
    }
}

impl AssetSource for MemorySource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.write().push(path.to_string());
        let entry = self.entries.read().get(path).cloned();
        let Some(entry) = entry else {
            return Err(FetchError::NotFound(path.to_string()));
        };
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }
        entry
            .bytes
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        format!("memory origin ({} files)", self.entries.read().len())
    }
}
