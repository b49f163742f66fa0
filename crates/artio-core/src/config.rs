use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection details for the artifact repository service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base service URL (e.g. `https://repo.example.com/artifactory`).
    pub url: String,

    /// How requests to the service authenticate.
    pub credentials: Credentials,
}

/// Authentication methods for the artifact repository.
///
/// Only token and basic auth can be rendered into a redirected npm
/// configuration; SSH is carried so the prerequisite check can reject it
/// with a clear error instead of failing mid-install.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credentials {
    Anonymous,
    AccessToken(String),
    Basic { user: String, password: String },
    Ssh { key_path: PathBuf },
}

impl ServerConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
        }
    }

    /// Base URL with a trailing slash guaranteed.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        }
    }

    /// The npm registry endpoint for a repository on this service.
    ///
    /// This is the URL the redirected `.npmrc` points npm at.
    #[must_use]
    pub fn npm_repository_url(&self, repo: &str) -> String {
        format!("{}api/npm/{repo}", self.base_url())
    }

    /// True when the configured credentials cannot be expressed as an
    /// npm auth block.
    #[must_use]
    pub fn uses_ssh_auth(&self) -> bool {
        matches!(self.credentials, Credentials::Ssh { .. })
    }
}
