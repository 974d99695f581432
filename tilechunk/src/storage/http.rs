//! Random-access reads over HTTP range requests.

use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tracing::warn;

use super::StorageError;

/// Block size of range requests.
pub const DEFAULT_BLOCK_SIZE: u64 = 256 * 1024;

/// Fetched blocks kept per reader.
const MAX_CACHED_BLOCKS: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Fetches byte ranges of a remote resource.
pub trait RangeFetcher: Send + Sync {
    /// Total size of the resource in bytes.
    fn content_length(&self, url: &str) -> Result<u64, StorageError>;

    /// Bytes `start..=end` of the resource.
    fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>, StorageError>;
}

/// [`RangeFetcher`] using a blocking reqwest client.
pub struct ReqwestRangeFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestRangeFetcher {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_timeout(60)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self, StorageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl RangeFetcher for ReqwestRangeFetcher {
    fn content_length(&self, url: &str) -> Result<u64, StorageError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| StorageError::Http(format!("HEAD {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(StorageError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| StorageError::Http(format!("{} has no Content-Length", url)))
    }

    fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .map_err(|e| StorageError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Http(format!("HTTP {} from {}", status, url)));
        }

        let body = response
            .bytes()
            .map_err(|e| StorageError::Http(format!("Failed to read response: {}", e)))?;

        // Servers without range support answer 200 with the whole body
        if status == StatusCode::OK {
            warn!(url = %url, bytes = body.len(), "Server ignored range request");
            let from = (start as usize).min(body.len());
            let to = (end as usize + 1).min(body.len());
            return Ok(body[from..to].to_vec());
        }
        Ok(body.to_vec())
    }
}

/// `Read + Seek` view of a remote resource, fetched in cached blocks.
pub struct HttpRangeReader {
    fetcher: Arc<dyn RangeFetcher>,
    url: String,
    len: u64,
    pos: u64,
    block_size: u64,
    /// Least recently read blocks are evicted first.
    blocks: LruCache<u64, Vec<u8>>,
}

impl HttpRangeReader {
    /// Opens `url`, issuing one request for its length.
    pub fn open(fetcher: Arc<dyn RangeFetcher>, url: impl Into<String>) -> Result<Self, StorageError> {
        let url = url.into();
        let len = fetcher.content_length(&url)?;
        Ok(Self {
            fetcher,
            url,
            len,
            pos: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            blocks: LruCache::new(MAX_CACHED_BLOCKS),
        })
    }

    /// Sets the block size of subsequent requests.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self.blocks.clear();
        self
    }

    /// Total size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn block(&mut self, index: u64) -> io::Result<&[u8]> {
        if !self.blocks.contains(&index) {
            let start = index * self.block_size;
            let end = (start + self.block_size).min(self.len) - 1;
            let bytes = self
                .fetcher
                .fetch_range(&self.url, start, end)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            self.blocks.put(index, bytes);
        }
        Ok(self.blocks.get(&index).map(Vec::as_slice).unwrap_or(&[]))
    }
}

impl Read for HttpRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let block_size = self.block_size;
        let index = self.pos / block_size;
        let offset = (self.pos % block_size) as usize;

        let block = self.block(index)?;
        if offset >= block.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short range response",
            ));
        }
        let n = buf.len().min(block.len() - offset);
        buf[..n].copy_from_slice(&block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of resource",
            )),
        }
    }
}
