//! Job configuration.
//!
//! [`ChunkConfig`] groups the tunables of a chunk job. Values start from
//! compiled-in defaults, are overlaid by an optional INI file (see
//! [`ChunkConfig::load`]) and finally by CLI flags in the binary.
//!
//! # Example
//!
//! ```
//! use tilechunk::config::ChunkConfig;
//!
//! let config = ChunkConfig::default().with_tile_dim(512).with_worker_threads(4);
//! assert_eq!(config.tile_dim, 512);
//! ```

mod file;

pub use file::{default_config_path, ConfigFileError};

use std::path::Path;

/// Default output tile edge length in pixels.
pub const DEFAULT_TILE_DIM: u32 = 1024;

/// Tile tasks per partition when sizing the render stage.
pub const DEFAULT_TASKS_PER_PARTITION: usize = 10;

/// Upper bound of the image-count floor on render partitions.
pub const DEFAULT_MAX_MIN_PARTITIONS: usize = 50;

/// Internal block size of staged working copies.
pub const DEFAULT_STAGING_BLOCK_SIZE: u32 = 512;

/// Region of the status queue.
pub const DEFAULT_STATUS_QUEUE_REGION: &str = "us-east-1";

/// Configuration for a chunk job.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    /// Output tile edge length in pixels.
    pub tile_dim: u32,

    /// Render partitions are `task_count / tasks_per_partition`, floored by
    /// the image count.
    pub tasks_per_partition: usize,

    /// Cap on the image-count floor of render partitions.
    pub max_min_partitions: usize,

    /// Worker threads for the parallel stages (0 = one per CPU).
    pub worker_threads: usize,

    /// Region of the status queue.
    pub status_queue_region: String,

    /// Internal block edge length of staged working copies.
    pub staging_block_size: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            tile_dim: DEFAULT_TILE_DIM,
            tasks_per_partition: DEFAULT_TASKS_PER_PARTITION,
            max_min_partitions: DEFAULT_MAX_MIN_PARTITIONS,
            worker_threads: 0,
            status_queue_region: DEFAULT_STATUS_QUEUE_REGION.to_string(),
            staging_block_size: DEFAULT_STAGING_BLOCK_SIZE,
        }
    }
}

impl ChunkConfig {
    /// Loads configuration from an INI file, starting from defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        file::load(path)
    }

    /// Loads the default config file if it exists, otherwise returns defaults.
    pub fn load_default() -> Result<Self, ConfigFileError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Set the tile edge length.
    pub fn with_tile_dim(mut self, tile_dim: u32) -> Self {
        self.tile_dim = tile_dim;
        self
    }

    /// Set the worker thread count.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the status queue region.
    pub fn with_status_queue_region(mut self, region: impl Into<String>) -> Self {
        self.status_queue_region = region.into();
        self
    }

    /// Partition count for the render stage.
    ///
    /// `max(task_count / tasks_per_partition, min(max_min_partitions,
    /// image_count))`, never less than one.
    pub fn render_partitions(&self, task_count: usize, image_count: usize) -> usize {
        let by_tasks = task_count / self.tasks_per_partition.max(1);
        let by_images = self.max_min_partitions.min(image_count);
        by_tasks.max(by_images).max(1)
    }
}
