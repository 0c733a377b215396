use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeserialize(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format: .{extension} ({path})")]
    UnsupportedFormat { extension: String, path: PathBuf },
    #[error("config file {path} has no numeric `version` field")]
    MissingVersion { path: PathBuf },
}

impl Error {
    #[must_use]
    pub fn unsupported_format(extension: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
