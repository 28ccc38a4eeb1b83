use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("user config directory could not be determined")]
    ConfigDirNotFound,

    #[error(
        "config file not found. Looked in:\n\
        - current directory: provisio.local.yaml, .provisio.local.yaml, provisio.yaml, .provisio.yaml\n\
        - ./.provisio/ directory\n\
        - ~/.config/provisio/provisio.yaml\n\
        Set PROVISIO_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
