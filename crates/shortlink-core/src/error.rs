//! Error types for the shortlink caches and store seam

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ArtifactCacheError {
    /// The cache was configured with room for no entries
    ZeroCapacity,
    /// The output directory does not exist
    MissingDirectory(PathBuf),
    Io {
        op: &'static str,
        path: PathBuf,
        source: Box<std::io::Error>,
    },
    Snapshot {
        path: PathBuf,
        source: Box<serde_json::Error>,
    },
}

impl ArtifactCacheError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ArtifactCacheError::Io {
            op,
            path: path.into(),
            source: Box::new(err),
        }
    }
}

impl fmt::Display for ArtifactCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactCacheError::ZeroCapacity => {
                write!(f, "Artifact cache capacity must be non-zero")
            }
            ArtifactCacheError::MissingDirectory(path) => {
                write!(f, "Artifact directory not found: {}", path.display())
            }
            ArtifactCacheError::Io { op, path, source } => {
                write!(f, "IO error during {} on {}: {}", op, path.display(), source)
            }
            ArtifactCacheError::Snapshot { path, source } => {
                write!(f, "Snapshot error in {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ArtifactCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactCacheError::Io { source, .. } => Some(source.as_ref()),
            ArtifactCacheError::Snapshot { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArtifactCacheError>;

#[derive(Debug, PartialEq, Eq)]
pub enum ResolutionCacheError {
    ZeroCapacity,
}

impl fmt::Display for ResolutionCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionCacheError::ZeroCapacity => {
                write!(f, "Resolution cache capacity must be non-zero")
            }
        }
    }
}

impl std::error::Error for ResolutionCacheError {}

/// Failure reported by a durable store backend
#[derive(Debug)]
pub enum StoreError {
    Backend(Box<dyn std::error::Error + Send + Sync>),
    Unavailable(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(err) => write!(f, "Store backend error: {}", err),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Backend(err) => Some(err.as_ref()),
            StoreError::Unavailable(_) => None,
        }
    }
}
