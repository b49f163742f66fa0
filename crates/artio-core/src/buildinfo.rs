//! Build-info manifest assembly and persistence.
//!
//! The final manifest lists every dependency that resolved against the
//! artifact repository, with its canonical artifact id and checksums.
//! Partials accumulate under the data directory keyed by build name and
//! number until an external publish step merges them.

use crate::error::Error;
use crate::npm::DependencyStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable to override the data directory (defaults to
/// `~/.artio`). Mostly useful in tests and CI.
pub const DATA_DIR_ENV: &str = "ARTIO_DATA_DIR";

/// Content checksums of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub sha1: String,
    pub md5: String,
}

/// One manifest entry: a dependency that was found in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDependency {
    /// Canonical artifact id (e.g. `lodash-4.17.21.tgz`).
    pub id: String,
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub checksum: Checksum,
}

/// Partition the store into manifest entries and missing dependencies.
///
/// Missing dependencies are reported as `name-version` identity keys; they
/// are a warning, not a failure, and never block persistence of the
/// dependencies that were found.
#[must_use]
pub fn partition(store: &DependencyStore) -> (Vec<BuildDependency>, Vec<String>) {
    let mut dependencies = Vec::new();
    let mut missing = Vec::new();

    for record in store.records() {
        if let Some(artifact) = &record.artifact {
            dependencies.push(BuildDependency {
                id: artifact.id.clone(),
                scopes: record.scopes.iter().map(ToString::to_string).collect(),
                checksum: artifact.checksum.clone(),
            });
        } else {
            missing.push(record.key());
        }
    }

    (dependencies, missing)
}

#[derive(Debug, Serialize, Deserialize)]
struct GeneralDetails {
    started: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartialBuildInfo {
    dependencies: Vec<BuildDependency>,
}

fn data_dir() -> Result<PathBuf, Error> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs_next::home_dir()
        .map(|home| home.join(".artio"))
        .ok_or_else(|| Error::other("could not determine a home directory for build-info storage"))
}

fn build_dir(build_name: &str, build_number: &str) -> Result<PathBuf, Error> {
    Ok(data_dir()?
        .join("builds")
        .join(format!("{build_name}_{build_number}")))
}

/// Record the general details (start time) of a build.
///
/// Repeated invocations for the same build keep the original start time.
pub fn save_build_general_details(build_name: &str, build_number: &str) -> Result<(), Error> {
    let dir = build_dir(build_name, build_number)?;
    fs::create_dir_all(&dir)?;

    let path = dir.join("details.json");
    if path.exists() {
        return Ok(());
    }

    let details = GeneralDetails {
        started: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_vec_pretty(&details)
        .map_err(|e| Error::other(format!("failed to serialize build details: {e}")))?;
    fs::write(&path, json)?;
    Ok(())
}

/// Persist one partial manifest for the given build.
///
/// Each invocation writes a distinct file so concurrent build steps never
/// clobber each other; the publish step merges all partials.
pub fn save_partial(
    build_name: &str,
    build_number: &str,
    dependencies: &[BuildDependency],
) -> Result<PathBuf, Error> {
    let dir = build_dir(build_name, build_number)?.join("partials");
    fs::create_dir_all(&dir)?;

    let partial = PartialBuildInfo {
        dependencies: dependencies.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&partial)
        .map_err(|e| Error::other(format!("failed to serialize build-info partial: {e}")))?;

    let file_name = format!(
        "dependencies-{}-{}.json",
        chrono::Utc::now().timestamp_millis(),
        std::process::id()
    );
    let path = dir.join(file_name);
    fs::write(&path, json)?;
    Ok(path)
}
