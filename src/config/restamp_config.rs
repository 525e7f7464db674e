use std::path::{Path, PathBuf};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAME: &str = ".restamp.yaml";
const DEFAULT_GIT_BINARY: &str = "git";
const DEFAULT_RENAME_LIMIT: u32 = 10_000;
const DEFAULT_REVISION: &str = "HEAD";

fn get_config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Settings read from the optional `.restamp.yaml` at the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestampConfig {
    pub git_binary: String,
    pub rename_limit: u32,
    pub revision: String,
}

impl Default for RestampConfig {
    fn default() -> Self {
        Self {
            git_binary: DEFAULT_GIT_BINARY.to_string(),
            rename_limit: DEFAULT_RENAME_LIMIT,
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

impl RestampConfig {
    pub async fn read(root: &Path) -> Result<Self, ConfigCreationError> {
        Self::from_path(get_config_file_path(root)).await
    }

    /// Reads the config file at `path`, falling back to the defaults when it does not exist.
    pub async fn from_path(path: PathBuf) -> Result<Self, ConfigCreationError> {
        debug!("Reading config file: {}", path.display());
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).context(ReadSnafu {
                    file_path: path.display().to_string(),
                });
            }
        };
        debug!("Successfully read config file: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        contents.as_str().try_into()
    }

    fn from_yaml_mapping(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, ConfigCreationError> {
        let mut config = Self::default();
        for (key, value) in top_level {
            let key = key.as_str().context(NonStringKeySnafu {
                key: format!("{key:?}"),
            })?;
            config.apply_entry(key, value)?;
        }
        Ok(config)
    }

    fn apply_entry(&mut self, key: &str, value: &Yaml) -> Result<(), ConfigCreationError> {
        match key {
            "git" => {
                self.git_binary = value
                    .as_str()
                    .context(InvalidValueSnafu {
                        key,
                        expected: "a string",
                    })?
                    .to_string();
            }
            "rename_limit" => {
                let Yaml::Value(Scalar::Integer(limit)) = value else {
                    return InvalidValueSnafu {
                        key,
                        expected: "an integer",
                    }
                    .fail();
                };
                self.rename_limit = u32::try_from(*limit).ok().context(InvalidValueSnafu {
                    key,
                    expected: "a non-negative 32 bit integer",
                })?;
            }
            "revision" => {
                self.revision = value
                    .as_str()
                    .context(InvalidValueSnafu {
                        key,
                        expected: "a string",
                    })?
                    .to_string();
            }
            _ => warn!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }
}

impl TryFrom<&str> for RestampConfig {
    type Error = ConfigCreationError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents)
            .map_err(|e| ConfigCreationError::ParseError { source: e })?;

        let Some(document) = documents.first() else {
            debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        };

        let top_level = document
            .as_mapping()
            .ok_or(ConfigCreationError::TopLevelNotMap)?;
        Self::from_yaml_mapping(top_level)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigCreationError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file is not valid UTF-8: {}", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Config keys should be strings, found {}", key))]
    NonStringKey { key: String },
    #[snafu(display("Config key '{}' should be {}", key, expected))]
    InvalidValue { key: String, expected: String },
}
