//! Resolved dependency tree parsing.
//!
//! `npm list --json` emits a nested name → `{version, dependencies}` object
//! describing every installed dependency and its already-resolved concrete
//! version. A strict decode into a typed tree replaces ad hoc JSON walking:
//! shape mismatches fail at decode time, not mid-traversal.

use super::store::{DependencyStore, Scope};
use crate::error::Error;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level `npm list --json` output. Fields other than `dependencies`
/// (name, version of the project itself, problems, ...) are irrelevant here.
#[derive(Debug, Deserialize)]
struct ListOutput {
    #[serde(default)]
    dependencies: BTreeMap<String, TreeNode>,
}

/// One node of the resolved tree.
///
/// `version` is optional at the type level so a missing field becomes a
/// domain error rather than a decode error; a resolved tree must always
/// carry a concrete version.
#[derive(Debug, Deserialize)]
struct TreeNode {
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, TreeNode>,
}

/// Walk one scope's resolved tree and populate the store.
///
/// Transitive dependencies inherit the scope of the path that reached them.
/// Traversal order carries no meaning; determinism of the final store comes
/// from the idempotent merge on the identity key.
///
/// # Errors
/// Fails with [`Error::MalformedTree`] if the JSON does not have the
/// expected shape or any node is missing its `version`. A store partially
/// populated by a failed parse is invalid and the discovery run must be
/// aborted.
pub fn collect_dependencies(
    tree_json: &[u8],
    scope: Scope,
    store: &mut DependencyStore,
) -> Result<(), Error> {
    let output: ListOutput = serde_json::from_slice(tree_json)
        .map_err(|e| Error::malformed_tree(format!("invalid `npm list --json` output: {e}")))?;
    walk(&output.dependencies, scope, store)
}

fn walk(
    nodes: &BTreeMap<String, TreeNode>,
    scope: Scope,
    store: &mut DependencyStore,
) -> Result<(), Error> {
    for (name, node) in nodes {
        let version = node
            .version
            .as_deref()
            .ok_or_else(|| Error::malformed_tree(format!("dependency '{name}' has no version")))?;
        store.insert_or_merge(name, version, scope);
        walk(&node.dependencies, scope, store)?;
    }
    Ok(())
}
