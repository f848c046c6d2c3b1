use chunk::ChunkConfig;
use log::warn;
use logging::LoggingConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use upgrade::{RegionCacheConfig, UpgradeConfig};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub mod chunk;
pub mod logging;
pub mod upgrade;

const CONFIG_ROOT_FOLDER: &str = "config/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't access configuration at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Couldn't parse config at {path:?}. Reason: {source}. This is probably caused by a config update; just delete the old config and start again")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the upgrader reads from `config/`, loaded once and handed to the server.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    pub basic: BasicConfiguration,
    pub advanced: AdvancedConfiguration,
}

impl ServerConfig {
    pub fn load(exec_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            basic: BasicConfiguration::load(exec_dir)?,
            advanced: AdvancedConfiguration::load(exec_dir)?,
        })
    }
}

/// Tuning knobs. The configuration should match vanilla by default.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AdvancedConfiguration {
    pub logging: LoggingConfig,
    pub chunk: ChunkConfig,
    pub region_cache: RegionCacheConfig,
    pub upgrade: UpgradeConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BasicConfiguration {
    /// The default level name
    pub default_level_name: String,
}

impl Default for BasicConfiguration {
    fn default() -> Self {
        Self {
            default_level_name: "world".to_string(),
        }
    }
}

impl BasicConfiguration {
    pub fn get_world_path(&self, exec_dir: &Path) -> PathBuf {
        exec_dir.join(&self.default_level_name)
    }
}

trait LoadConfiguration {
    fn load(exec_dir: &Path) -> Result<Self, ConfigError>
    where
        Self: Sized + Default + Serialize + DeserializeOwned,
    {
        let config_dir = exec_dir.join(CONFIG_ROOT_FOLDER);
        if !config_dir.exists() {
            log::debug!("creating new config root folder");
            fs::create_dir(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
        }
        let path = config_dir.join(Self::get_path());

        let config = if path.exists() {
            let file_content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;

            toml::from_str(&file_content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            let content = Self::default();

            match toml::to_string(&content) {
                Ok(serialized) => {
                    if let Err(err) = fs::write(&path, serialized) {
                        warn!("Couldn't write default config to {:?}. Reason: {}", &path, err);
                    }
                }
                Err(err) => warn!("Couldn't serialize default config for {:?}: {}", &path, err),
            }

            content
        };

        config.validate()?;
        Ok(config)
    }

    fn get_path() -> &'static Path;

    fn validate(&self) -> Result<(), ConfigError>;
}

impl LoadConfiguration for AdvancedConfiguration {
    fn get_path() -> &'static Path {
        Path::new("features.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let compression = &self.chunk.compression;
        if compression.level > 9 {
            return Err(ConfigError::Invalid(format!(
                "chunk compression level must be between 0 and 9, got {}",
                compression.level
            )));
        }
        if self.upgrade.max_pending_chunks == 0 {
            return Err(ConfigError::Invalid(
                "upgrade.max_pending_chunks must be at least 1".to_string(),
            ));
        }
        if self.upgrade.writable_radius > upgrade::MAX_WRITABLE_RADIUS {
            return Err(ConfigError::Invalid(format!(
                "upgrade.writable_radius must be at most {}, got {}",
                upgrade::MAX_WRITABLE_RADIUS,
                self.upgrade.writable_radius
            )));
        }
        Ok(())
    }
}

impl LoadConfiguration for BasicConfiguration {
    fn get_path() -> &'static Path {
        Path::new("configuration.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_level_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_level_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use temp_dir::TempDir;

    use crate::{chunk::Compression, ConfigError, ServerConfig};

    #[test]
    fn missing_files_are_written_with_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::load(dir.path()).unwrap();

        assert_eq!(config.basic.default_level_name, "world");
        assert_eq!(config.advanced.region_cache.upgrade_capacity.get(), 8);
        assert_eq!(config.advanced.region_cache.gameplay_capacity.get(), 256);
        assert_eq!(config.advanced.upgrade.max_pending_chunks, 3000);
        assert!(dir.path().join("config/features.toml").exists());
        assert!(dir.path().join("config/configuration.toml").exists());

        let reloaded = ServerConfig::load(dir.path()).unwrap();
        assert_eq!(reloaded.advanced, config.advanced);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/features.toml"),
            "[chunk.compression]\nalgorithm = \"LZ4\"\n\n[upgrade]\nversions = []\n",
        )
        .unwrap();

        let config = ServerConfig::load(dir.path()).unwrap();
        assert_eq!(config.advanced.chunk.compression.algorithm, Compression::LZ4);
        assert_eq!(config.advanced.chunk.compression.level, 6);
        assert!(config.advanced.upgrade.versions.is_empty());
        assert_eq!(config.advanced.upgrade.writable_radius, 1);
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/configuration.toml"), "default_level_name = [").unwrap();

        match ServerConfig::load(dir.path()) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("configuration.toml")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn compression_level_is_validated() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/features.toml"),
            "[chunk.compression]\nlevel = 12\n",
        )
        .unwrap();

        assert!(matches!(
            ServerConfig::load(dir.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn writable_radius_is_bounded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/features.toml"),
            "[upgrade]\nwritable_radius = 4294967295\n",
        )
        .unwrap();

        match ServerConfig::load(dir.path()) {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("writable_radius")),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
