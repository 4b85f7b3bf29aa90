//! # Dataset configuration
//!
//! Reads the parts of a Valhalla config (`valhalla.json`) that a batch needs.
//! Everything else in the file is ignored.

use crate::WorkerCount;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use valinor_graphtile::tile_provider::DirectoryGraphTileProvider;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("The config does not set mjolnir.tile_dir")]
    MissingTileDir,
    #[error("The tile directory {0} does not exist")]
    TileDirNotFound(PathBuf),
    #[error("The tile directory {0} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Default, Deserialize)]
struct ValhallaConfig {
    #[serde(default)]
    mjolnir: MjolnirConfig,
}

#[derive(Debug, Default, Deserialize)]
struct MjolnirConfig {
    tile_dir: Option<String>,
    tile_extract: Option<String>,
    concurrency: Option<usize>,
}

/// A validated batch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Root of the (loose) tile directory.
    pub tile_dir: PathBuf,
    /// Set when the config also names a tile archive.
    /// Archives are never modified, so this is informational.
    pub tile_extract: Option<PathBuf>,
    /// The configured number of workers. `None` means "use the hardware default."
    pub concurrency: Option<usize>,
}

impl BatchConfig {
    /// Parses and validates a config from a JSON string.
    ///
    /// # Errors
    ///
    /// Fails if the JSON is invalid, or if `mjolnir.tile_dir` is missing
    /// or doesn't point at a directory.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ValhallaConfig = serde_json::from_str(json)?;
        let MjolnirConfig {
            tile_dir,
            tile_extract,
            concurrency,
        } = config.mjolnir;

        let tile_dir = tile_dir
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingTileDir)?;
        if !tile_dir.exists() {
            return Err(ConfigError::TileDirNotFound(tile_dir));
        }
        if !tile_dir.is_dir() {
            return Err(ConfigError::NotADirectory(tile_dir));
        }

        let tile_extract = tile_extract
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        if let Some(path) = &tile_extract {
            info!(
                path = %path.display(),
                "Ignoring tile_extract; only the tile directory is modified"
            );
        }

        Ok(Self {
            tile_dir,
            tile_extract,
            concurrency: concurrency.filter(|&count| count > 0),
        })
    }

    /// Reads a config file.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read, or for any of the reasons in [`BatchConfig::from_json_str`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// The worker count, with an optional override (ex: from the command line) taking precedence.
    pub fn workers(&self, requested: Option<usize>) -> WorkerCount {
        WorkerCount::or_default(requested.filter(|&count| count > 0).or(self.concurrency))
    }

    /// A fresh handle to the tile directory.
    pub fn tile_provider(&self) -> DirectoryGraphTileProvider {
        DirectoryGraphTileProvider::new(self.tile_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(mjolnir: &serde_json::Value) -> String {
        serde_json::json!({ "mjolnir": mjolnir, "loki": { "actions": ["route"] } }).to_string()
    }

    #[test]
    fn test_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let json = config_json(&serde_json::json!({
            "tile_dir": dir.path(),
            "tile_extract": "/data/tiles.tar",
            "concurrency": 3,
            "max_cache_size": 1_000_000,
        }));

        let config = BatchConfig::from_json_str(&json).unwrap();
        assert_eq!(config.tile_dir, dir.path());
        assert_eq!(config.tile_extract, Some(PathBuf::from("/data/tiles.tar")));
        assert_eq!(config.concurrency, Some(3));
        assert_eq!(config.workers(None).get(), 3);
        assert_eq!(config.workers(Some(7)).get(), 7);
        assert_eq!(config.workers(Some(0)).get(), 3);
        assert_eq!(config.tile_provider().base_directory(), dir.path());
    }

    #[test]
    fn test_zero_concurrency_means_default() {
        let dir = tempfile::tempdir().unwrap();
        let json = config_json(&serde_json::json!({
            "tile_dir": dir.path(),
            "tile_extract": "",
            "concurrency": 0,
        }));

        let config = BatchConfig::from_json_str(&json).unwrap();
        assert_eq!(config.tile_extract, None);
        assert_eq!(config.concurrency, None);
        assert_eq!(config.workers(None), WorkerCount::default());
    }

    #[test]
    fn test_missing_tile_dir() {
        for json in [
            "{}".to_string(),
            config_json(&serde_json::json!({})),
            config_json(&serde_json::json!({ "tile_dir": "" })),
        ] {
            assert!(
                matches!(
                    BatchConfig::from_json_str(&json),
                    Err(ConfigError::MissingTileDir)
                ),
                "{json}"
            );
        }
    }

    #[test]
    fn test_tile_dir_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let json = config_json(&serde_json::json!({ "tile_dir": missing }));
        assert!(matches!(
            BatchConfig::from_json_str(&json),
            Err(ConfigError::TileDirNotFound(path)) if path == missing
        ));

        let file = dir.path().join("valhalla.json");
        std::fs::write(&file, "{}").unwrap();
        let json = config_json(&serde_json::json!({ "tile_dir": file }));
        assert!(matches!(
            BatchConfig::from_json_str(&json),
            Err(ConfigError::NotADirectory(path)) if path == file
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            BatchConfig::from_json_str("{ mjolnir"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BatchConfig::from_json_str(r#"{ "mjolnir": { "concurrency": "lots" } }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valhalla.json");
        assert!(matches!(
            BatchConfig::from_file(&path),
            Err(ConfigError::Read { .. })
        ));

        std::fs::write(&path, config_json(&serde_json::json!({ "tile_dir": dir.path() }))).unwrap();
        assert_eq!(BatchConfig::from_file(&path).unwrap().tile_dir, dir.path());
    }
}
