//! Job-level error taxonomy.
//!
//! Every error is job-fatal: stages stop at the first failing unit and the
//! orchestrator turns the error into a single FAILED status message.

use thiserror::Error;

use crate::config::ConfigFileError;
use crate::storage::StorageError;

/// Boxed error used to carry the underlying cause of a stage failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pipeline operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors that abort a chunk job.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// The URI uses a scheme other than a local path, `s3` or `http`.
    #[error("Unsupported scheme: {scheme} ({uri})")]
    UnsupportedScheme { scheme: String, uri: String },

    /// A source image could not be read or re-encoded into the workspace.
    #[error("failed to stage {uri}: {source}")]
    Staging {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// A staged image could not be analyzed (missing georeferencing, CRS
    /// transform failure).
    #[error("failed to analyze {uri}: {source}")]
    Analysis {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// Reprojection or write failure on a single tile.
    #[error("failed to render {target}: {source}")]
    Render {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The status queue rejected a message.
    #[error("status notification failed: {0}")]
    Notification(String),

    /// Writing or reading through a storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The job manifest could not be serialized.
    #[error("failed to build manifest: {0}")]
    Manifest(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigFileError),

    /// The worker pool could not be created.
    #[error("executor error: {0}")]
    Executor(String),
}

impl ChunkError {
    /// Wraps a raster or storage failure raised while staging `uri`.
    pub fn staging(uri: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Staging {
            uri: uri.into(),
            source: source.into(),
        }
    }

    /// Wraps a failure raised while analyzing `uri`.
    pub fn analysis(uri: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Analysis {
            uri: uri.into(),
            source: source.into(),
        }
    }

    /// Wraps a failure raised while rendering the tile at `target`.
    pub fn render(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Render {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Type name used in FAILED status messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ChunkError::UnsupportedScheme { .. } => "UnsupportedSchemeError",
            ChunkError::Staging { .. } => "StagingError",
            ChunkError::Analysis { .. } => "AnalysisError",
            ChunkError::Render { .. } => "RenderError",
            ChunkError::Notification(_) => "NotificationError",
            ChunkError::Storage(_) => "StorageError",
            ChunkError::Manifest(_) => "ManifestError",
            ChunkError::Config(_) => "ConfigError",
            ChunkError::Executor(_) => "ExecutorError",
        }
    }

    /// `"<kind>: <message>"`, the text carried by a FAILED status message.
    pub fn status_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
