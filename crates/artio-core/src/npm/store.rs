//! In-memory dependency store populated during discovery.

use crate::buildinfo::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Usage scope of a dependency, determined by the path through which it was
/// reached in the resolved tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Production,
    Development,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical artifact identity plus content checksums, as reported by the
/// artifact repository for one (name, version) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// The name/path the repository refers to the physical artifact by.
    pub id: String,
    pub checksum: Checksum,
}

/// One discovered dependency and everything accumulated about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub name: String,
    pub version: String,
    /// Never empty; grows monotonically as the same (name, version) is seen
    /// under different usage contexts.
    pub scopes: BTreeSet<Scope>,
    /// Present only once the checksum resolver found a match.
    pub artifact: Option<ResolvedArtifact>,
}

impl DependencyRecord {
    fn new(name: &str, version: &str, scope: Scope) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            scopes: BTreeSet::from([scope]),
            artifact: None,
        }
    }

    /// Identity key: exact `name + "-" + version` concatenation.
    #[must_use]
    pub fn key(&self) -> String {
        dependency_key(&self.name, &self.version)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Identity key for a (name, version) pair.
#[must_use]
pub fn dependency_key(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

/// Deduplicated mapping from dependency identity to its record.
///
/// Built single-threaded by the tree parser, consumed once at manifest
/// assembly time.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DependencyStore {
    records: BTreeMap<String, DependencyRecord>,
}

impl DependencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a dependency or merge a scope into an existing record.
    ///
    /// The merge is idempotent: inserting the same (name, version, scope)
    /// twice changes nothing, and a diamond dependency seen under multiple
    /// parents yields exactly one record.
    pub fn insert_or_merge(&mut self, name: &str, version: &str, scope: Scope) {
        self.records
            .entry(dependency_key(name, version))
            .and_modify(|record| {
                record.scopes.insert(scope);
            })
            .or_insert_with(|| DependencyRecord::new(name, version, scope));
    }

    /// Attach the resolved artifact to a record.
    ///
    /// A record transitions to resolved exactly once; a second call for the
    /// same key keeps the first result.
    pub fn mark_resolved(&mut self, key: &str, artifact: ResolvedArtifact) {
        if let Some(record) = self.records.get_mut(key) {
            if record.artifact.is_none() {
                record.artifact = Some(artifact);
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DependencyRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &DependencyRecord> {
        self.records.values()
    }
}
