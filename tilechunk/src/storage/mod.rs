//! Byte storage for staged copies, tiles and manifests.
//!
//! Writes go through [`TargetWriter`], which dispatches on the target URI:
//! local paths are written with `std::fs` (parents created on demand) and
//! `s3://` keys are handed to an [`ObjectStore`]. Remote rasters are read
//! through [`HttpRangeReader`].

mod http;
mod s3;

pub use http::{HttpRangeReader, RangeFetcher, ReqwestRangeFetcher};
pub use s3::S3Store;

pub(crate) use s3::block_on;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::error::ChunkResult;
use crate::uri::Location;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write to read-only location {0}")]
    ReadOnly(String),

    #[error("no object store configured for {0}")]
    NoObjectStore(String),

    #[error("object store request failed: {0}")]
    Remote(String),

    #[error("HTTP read failed: {0}")]
    Http(String),
}

/// Metadata attached to an uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// MIME type of the body.
    pub content_type: Option<String>,
    /// Grant public read access.
    pub public_read: bool,
}

impl PutOptions {
    /// Publicly readable GeoTIFF.
    pub fn tiff() -> Self {
        Self {
            content_type: Some("image/tiff".to_string()),
            public_read: true,
        }
    }

    /// Private JSON document.
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            public_read: false,
        }
    }
}

/// Key/value object storage.
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `bucket/key`.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<(), StorageError>;
}

/// In-memory object store.
///
/// Used when no remote store is available and in tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, PutOptions)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body and options stored under `bucket/key`.
    pub fn get(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, PutOptions)> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All stored keys of `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            (bytes, options.clone()),
        );
        Ok(())
    }
}

/// Writes bytes to a local path or object-storage URI.
#[derive(Clone, Default)]
pub struct TargetWriter {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl TargetWriter {
    /// Writer that only accepts local paths.
    pub fn local_only() -> Self {
        Self::default()
    }

    /// Writer that sends `s3://` targets to `store`.
    pub fn with_object_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            object_store: Some(store),
        }
    }

    /// Writes `bytes` to `uri`.
    ///
    /// # Errors
    ///
    /// Fails for unsupported schemes, `http://` targets, `s3://` targets
    /// without an object store, and I/O or upload errors.
    pub fn put(&self, uri: &str, bytes: Vec<u8>, options: &PutOptions) -> ChunkResult<()> {
        match Location::parse(uri)? {
            Location::Local(path) => {
                write_local(&path, &bytes)?;
            }
            Location::S3 { bucket, key } => {
                let store = self
                    .object_store
                    .as_ref()
                    .ok_or_else(|| StorageError::NoObjectStore(uri.to_string()))?;
                store.put_object(&bucket, &key, bytes, options)?;
            }
            Location::Http(url) => return Err(StorageError::ReadOnly(url).into()),
        }
        debug!(target = uri, "Wrote object");
        Ok(())
    }
}

fn write_local(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)
}
