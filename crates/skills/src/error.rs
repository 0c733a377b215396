use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid skill source '{input}': {reason}")]
    InvalidSource { input: String, reason: String },

    #[error("{operation} is not supported for {kind} sources")]
    UnsupportedOperation {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("git clone of {url} failed: {reason}")]
    GitClone { url: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    SkillParse { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("filesystem operation on {path} failed: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no installable skills found in {source_id}")]
    NoSkillsFound { source_id: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_source(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            input: input.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unsupported(operation: &'static str, kind: &'static str) -> Self {
        Self::UnsupportedOperation { operation, kind }
    }

    #[must_use]
    pub fn git_clone(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GitClone {
            url: url.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn skill_parse(path: &Path, reason: impl Into<String>) -> Self {
        Self::SkillParse {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub fn filesystem(path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GitClone { .. } | Self::Network { .. } | Self::HttpStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
