//! tilechunk - reproject raster imagery into a web-map tile grid
//!
//! This library turns one or more arbitrarily-projected GeoTIFFs into
//! fixed-size Web Mercator tiles at a single zoom level per image, chosen
//! from the image's native resolution.
//!
//! # Pipeline
//!
//! ```text
//! inputs ─► uri ─► workspace::plan ─► workspace::stage ─► analyzer
//!                                        (parallel)          │
//!                                                            ▼
//!         manifest ◄── render (parallel, partitioned) ◄── tasks
//! ```
//!
//! The [`job::ChunkJob`] orchestrator wires the stages together, runs the
//! parallel ones through a [`executor::ParallelExecutor`], and reports job
//! lifecycle events through a [`notify::StatusNotifier`].

pub mod analyzer;
pub mod config;
pub mod coord;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod manifest;
pub mod notify;
pub mod raster;
pub mod render;
pub mod storage;
pub mod tasks;
pub mod uri;
pub mod workspace;

pub use error::{ChunkError, ChunkResult};
pub use job::{ChunkJob, JobOutcome, JobSpec};
