//! URI scheme dispatch and normalization.
//!
//! Inputs, workspace targets and outputs are plain strings that are either
//! local paths (no scheme), `s3://bucket/key` object-storage URIs, or
//! `http://` URLs. [`Location::parse`] classifies them for writes and
//! [`readable_path`] turns them into something the raster reader can open.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ChunkError, ChunkResult};

/// Scheme-classified storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local filesystem path.
    Local(PathBuf),
    /// Object-storage key.
    S3 { bucket: String, key: String },
    /// Read-only HTTP resource.
    Http(String),
}

impl Location {
    /// Classifies `uri` by scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::UnsupportedScheme`] for anything other than a
    /// local path, `s3` or `http`.
    pub fn parse(uri: &str) -> ChunkResult<Self> {
        match split_scheme(uri) {
            None => Ok(Location::Local(PathBuf::from(uri))),
            Some(("s3", rest)) => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                Ok(Location::S3 {
                    bucket: bucket.to_string(),
                    key: key.trim_start_matches('/').to_string(),
                })
            }
            Some(("http", _)) => Ok(Location::Http(uri.to_string())),
            Some((scheme, _)) => Err(ChunkError::UnsupportedScheme {
                scheme: scheme.to_string(),
                uri: uri.to_string(),
            }),
        }
    }
}

/// A path the raster reader can open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RasterPath {
    /// Read directly from the local filesystem.
    Local(PathBuf),
    /// Read through HTTP range requests.
    Remote(String),
}

impl RasterPath {
    /// Local path, if this is a local raster.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            RasterPath::Local(path) => Some(path),
            RasterPath::Remote(_) => None,
        }
    }
}

impl fmt::Display for RasterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterPath::Local(path) => write!(f, "{}", path.display()),
            RasterPath::Remote(url) => write!(f, "/vsicurl/{}", url),
        }
    }
}

/// Normalizes `uri` into a raster-readable path.
///
/// Local paths pass through unchanged. `s3://bucket/key` is rewritten to the
/// bucket's public HTTP endpoint and `http://` URLs are read with range
/// requests.
pub fn readable_path(uri: &str) -> ChunkResult<RasterPath> {
    match Location::parse(uri)? {
        Location::Local(path) => Ok(RasterPath::Local(path)),
        Location::S3 { bucket, key } => Ok(RasterPath::Remote(format!(
            "http://{}.s3.amazonaws.com/{}",
            bucket, key
        ))),
        Location::Http(url) => Ok(RasterPath::Remote(url)),
    }
}

/// Joins a relative path onto a local or remote base with `/`.
pub fn join(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Filename of `uri` without directory or extension.
pub fn file_stem(uri: &str) -> &str {
    let name = uri.rsplit('/').next().unwrap_or(uri);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}
