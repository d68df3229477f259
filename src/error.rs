use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the viewer facade.
///
/// Only configuration mistakes and an unusable rendering host end up here;
/// missing files and slow origins are absorbed into degraded states.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("invalid viewer configuration: {0}")]
    InvalidConfig(String),
    #[error("viewer unavailable: {0}")]
    Unavailable(String),
    #[error("viewer has already been initialized")]
    AlreadyInitialized,
    #[error("viewer has been disposed")]
    Disposed,
}

/// Failure reported by an asset origin for a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("fetching {path} timed out after {elapsed:?}")]
    TimedOut { path: String, elapsed: Duration },
}

/// Reason a primary asset load produced no usable geometry.
///
/// Carried as data inside [`crate::resolver::LoadOutcome::Failed`]; the viewer
/// reacts by substituting a placeholder primitive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadFailure {
    #[error("no asset path configured")]
    MissingPath,
    #[error("asset not found: {path} ({reason})")]
    AssetNotFound { path: String, reason: String },
    #[error("asset {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
    #[error("asset {path} has no renderable geometry")]
    EmptyGeometry { path: String },
    #[error("loading {path} timed out")]
    TimedOut { path: String },
}

impl LoadFailure {
    pub(crate) fn from_fetch(path: &str, err: FetchError) -> Self {
        match err {
            FetchError::TimedOut { .. } => Self::TimedOut {
                path: path.to_string(),
            },
            other => Self::AssetNotFound {
                path: path.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Non-fatal problem attached to a degraded load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadWarning {
    #[error("material {path} unavailable ({reason}); using default material")]
    MaterialUnavailable { path: String, reason: String },
    #[error("texture {path} unavailable ({reason}); using solid color")]
    TextureUnavailable { path: String, reason: String },
}

/// Why a backdrop fell back to the procedural grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackdropFallback {
    #[error("no backdrop scene could be loaded ({attempts} candidate(s) tried)")]
    BackdropUnavailable { attempts: usize },
    #[error("backdrop image {path} unavailable: {reason}")]
    ImageUnavailable { path: String, reason: String },
    #[error("custom backdrop requested without an image path")]
    MissingImagePath,
}
