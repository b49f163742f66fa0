//! Artifact repository client.

use crate::buildinfo::Checksum;
use crate::config::{Credentials, ServerConfig};
use crate::error::Error;
use crate::npm::ResolvedArtifact;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Client for the artifact repository's REST API.
#[derive(Debug, Clone)]
pub struct RepoClient {
    base_url: Url,
    credentials: Credentials,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct AqlSearchResult {
    #[serde(default)]
    results: Vec<AqlItem>,
}

#[derive(Debug, Deserialize)]
struct AqlItem {
    name: String,
    #[serde(default)]
    actual_sha1: String,
    #[serde(default)]
    actual_md5: String,
}

impl RepoClient {
    /// Create a client for the given server.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn new(config: &ServerConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| Error::registry(format!("invalid server URL '{}': {e}", config.url)))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("artio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::registry(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            credentials: config.credentials.clone(),
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::AccessToken(token) => request.bearer_auth(token),
            Credentials::Basic { user, password } => request.basic_auth(user, Some(password)),
            Credentials::Anonymous | Credentials::Ssh { .. } => request,
        }
    }

    /// Fetch the repository's npm auth block (`api/npm/auth`).
    ///
    /// The body is the literal `.npmrc` auth snippet and is appended to the
    /// redirected config unmodified.
    pub async fn npm_auth(&self) -> Result<String, Error> {
        let url = self
            .base_url
            .join("api/npm/auth")
            .map_err(|e| Error::registry(format!("failed to build npm auth URL: {e}")))?;

        let response = self.authenticated(self.http.get(url)).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::registry(format!(
                "npm auth request returned {status}:\n{body}"
            )));
        }
        Ok(body)
    }

    /// Look up the artifact backing one (name, version) pair via AQL.
    ///
    /// Zero matches is `Ok(None)`: the dependency simply is not in the
    /// repository. Matching is exact on both name and version.
    pub async fn find_npm_artifact(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<ResolvedArtifact>, Error> {
        let url = self
            .base_url
            .join("api/search/aql")
            .map_err(|e| Error::registry(format!("failed to build AQL URL: {e}")))?;

        let response = self
            .authenticated(
                self.http
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "text/plain")
                    .body(npm_aql_query(name, version)),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::registry(format!(
                "AQL search for {name}@{version} returned {status}:\n{body}"
            )));
        }

        let parsed: AqlSearchResult = response.json().await?;
        Ok(parsed.results.into_iter().next().map(|item| ResolvedArtifact {
            id: item.name,
            checksum: Checksum {
                sha1: item.actual_sha1,
                md5: item.actual_md5,
            },
        }))
    }
}

/// AQL query matching the npm package properties the repository stamps on
/// uploaded tarballs.
fn npm_aql_query(name: &str, version: &str) -> String {
    format!(
        r#"items.find({{"@npm.name":"{name}","@npm.version":"{version}"}}).include("name","actual_md5","actual_sha1")"#
    )
}
