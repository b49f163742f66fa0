use std::path::PathBuf;
use thiserror::Error;

/// Core error type for artio operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not find an npm executable on PATH")]
    NpmNotFound,

    #[error("npm {version} is not supported: the npm-install command requires npm client version 5.4.0 or higher")]
    UnsupportedNpmVersion { version: String },

    #[error("SSH authentication is not supported by the npm-install command")]
    UnsupportedAuth,

    #[error("npm {command} failed: {message}")]
    Npm { command: String, message: String },

    #[error("malformed dependency tree: {0}")]
    MalformedTree(String),

    #[error("failed to {action} {}: {source}", .path.display())]
    ConfigIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("two errors occurred:\n{restore}\n{cause}")]
    RestoreFailed { restore: Box<Error>, cause: Box<Error> },

    #[error("artifact repository error: {0}")]
    Registry(String),

    #[error("{} dependency lookups failed:\n{}", .causes.len(), join_causes(.causes))]
    Lookup { causes: Vec<Error> },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Failure of an npm subprocess, tagged with the subcommand that ran.
    pub fn npm(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Npm {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn malformed_tree(msg: impl Into<String>) -> Self {
        Self::MalformedTree(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Registry(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Registry(format!("connection failed: {e}"))
        } else {
            Self::Registry(e.to_string())
        }
    }
}

fn join_causes(causes: &[Error]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
