//! INI config file parsing.
//!
//! ```ini
//! [tiler]
//! tile_dim = 1024
//!
//! [executor]
//! threads = 8
//! tasks_per_partition = 10
//! max_min_partitions = 50
//!
//! [status]
//! region = us-east-1
//!
//! [staging]
//! block_size = 512
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use super::ChunkConfig;

/// Errors raised while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read or is not valid INI.
    #[error("failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// A key holds a value outside its accepted range.
    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Default config location: `<config_dir>/tilechunk/config.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tilechunk").join("config.ini"))
}

pub(super) fn load(path: &Path) -> Result<ChunkConfig, ConfigFileError> {
    let ini = Ini::load_from_file(path).map_err(|e| ConfigFileError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_ini(&ini)
}

/// Overlays the values found in `ini` onto `ChunkConfig::default()`.
pub(super) fn parse_ini(ini: &Ini) -> Result<ChunkConfig, ConfigFileError> {
    let mut config = ChunkConfig::default();

    if let Some(section) = ini.section(Some("tiler")) {
        if let Some(v) = section.get("tile_dim") {
            config.tile_dim = parse_positive("tiler", "tile_dim", v)?;
        }
    }

    if let Some(section) = ini.section(Some("executor")) {
        if let Some(v) = section.get("threads") {
            config.worker_threads = parse_value("executor", "threads", v, "must be an integer")?;
        }
        if let Some(v) = section.get("tasks_per_partition") {
            config.tasks_per_partition = parse_positive("executor", "tasks_per_partition", v)?;
        }
        if let Some(v) = section.get("max_min_partitions") {
            config.max_min_partitions = parse_positive("executor", "max_min_partitions", v)?;
        }
    }

    if let Some(section) = ini.section(Some("status")) {
        if let Some(v) = section.get("region") {
            let v = v.trim();
            if !v.is_empty() {
                config.status_queue_region = v.to_string();
            }
        }
    }

    if let Some(section) = ini.section(Some("staging")) {
        if let Some(v) = section.get("block_size") {
            let size: u32 = parse_positive("staging", "block_size", v)?;
            // TIFF tile dimensions must be multiples of 16
            if size % 16 != 0 {
                return Err(invalid("staging", "block_size", v, "must be a multiple of 16"));
            }
            config.staging_block_size = size;
        }
    }

    Ok(config)
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_value(section, key, value, "must be a positive integer")?;
    if parsed <= T::default() {
        return Err(invalid(section, key, value, "must be a positive integer"));
    }
    Ok(parsed)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Result<ChunkConfig, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(parse("").unwrap(), ChunkConfig::default());
    }

    #[test]
    fn test_all_sections() {
        let config = parse(
            "[tiler]\ntile_dim = 256\n\
             [executor]\nthreads = 6\ntasks_per_partition = 20\nmax_min_partitions = 8\n\
             [status]\nregion = eu-central-1\n\
             [staging]\nblock_size = 256\n",
        )
        .unwrap();

        assert_eq!(config.tile_dim, 256);
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.tasks_per_partition, 20);
        assert_eq!(config.max_min_partitions, 8);
        assert_eq!(config.status_queue_region, "eu-central-1");
        assert_eq!(config.staging_block_size, 256);
    }

    #[test]
    fn test_zero_tile_dim_rejected() {
        let err = parse("[tiler]\ntile_dim = 0\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "tile_dim"));
    }

    #[test]
    fn test_non_numeric_threads_rejected() {
        let err = parse("[executor]\nthreads = many\n").unwrap_err();
        assert!(err.to_string().contains("[executor] threads"));
    }

    #[test]
    fn test_block_size_must_be_multiple_of_16() {
        assert!(parse("[staging]\nblock_size = 500\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tiler]\ntile_dim = 512").unwrap();

        let config = ChunkConfig::load(file.path()).unwrap();
        assert_eq!(config.tile_dim, 512);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ChunkConfig::load(Path::new("/nonexistent/tilechunk.ini")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Read { .. }));
    }
}
