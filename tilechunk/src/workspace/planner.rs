//! Workspace key assignment.

use std::collections::HashSet;

use tracing::debug;

use crate::error::ChunkResult;
use crate::uri::{file_stem, join, readable_path, RasterPath};

/// Paths derived for one input image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriSet {
    /// Raster-readable form of the input.
    pub source_uri: RasterPath,
    /// Where the working copy is written.
    pub workspace_target: String,
    /// Raster-readable form of `workspace_target`.
    pub workspace_source_uri: RasterPath,
    /// Folder receiving this image's tiles.
    pub image_folder: String,
    /// Zero-based position among the job inputs.
    pub order: usize,
}

/// Keys already handed out during planning.
#[derive(Debug, Default)]
pub struct WorkspaceKeyRegistry {
    keys: HashSet<String>,
}

impl WorkspaceKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the first free key among `base`, `base-1`, `base-2`, ...
    pub fn assign(&mut self, base: &str) -> String {
        if self.keys.insert(base.to_string()) {
            return base.to_string();
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if self.keys.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Plans workspace paths for `images`, in input order.
///
/// # Errors
///
/// Fails with `UnsupportedScheme` if an input or the workspace uses a scheme
/// other than a local path, `s3` or `http`.
pub fn plan_workspace(images: &[String], workspace: &str) -> ChunkResult<Vec<UriSet>> {
    let mut registry = WorkspaceKeyRegistry::new();

    images
        .iter()
        .enumerate()
        .map(|(order, image)| {
            let source_uri = readable_path(image)?;
            let key = registry.assign(file_stem(image));
            let workspace_target = join(workspace, &format!("{}-workingcopy.tif", key));
            let workspace_source_uri = readable_path(&workspace_target)?;
            let image_folder = join(workspace, &key);

            debug!(image = %image, key = %key, order, "Planned workspace entry");

            Ok(UriSet {
                source_uri,
                workspace_target,
                workspace_source_uri,
                image_folder,
                order,
            })
        })
        .collect()
}
