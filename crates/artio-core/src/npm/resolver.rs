//! Checksum resolution against the artifact repository.
//!
//! One lookup task per distinct dependency key, at most `concurrency` in
//! flight at a time. The stream always drains fully: a failing lookup never
//! cancels its siblings. Results are collected first and applied to the
//! store afterwards, so the store is only ever mutated single-threaded.

use super::store::{DependencyStore, ResolvedArtifact};
use crate::error::Error;
use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

/// Default number of concurrent repository lookups. The remote index is a
/// network service; a small fixed bound keeps fan-out polite while staying
/// far faster than serial resolution for dependency sets in the hundreds.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Counts from one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Records that now carry an artifact identity and checksums.
    pub resolved: usize,
    /// Records the repository had no match for (left unresolved, not an error).
    pub missing: usize,
}

/// Resolve artifact identities and checksums for every record in the store.
///
/// `lookup` maps a (name, version) pair to zero or one repository match.
/// `Ok(None)` leaves the record unresolved. Per-task errors are collected
/// while the remaining tasks run to completion, then surfaced as a single
/// aggregated [`Error::Lookup`]. The operation is order-independent: the
/// final store contents do not depend on the concurrency bound.
pub async fn resolve_checksums<F, Fut>(
    store: &mut DependencyStore,
    concurrency: usize,
    lookup: F,
) -> Result<ResolveStats, Error>
where
    F: Fn(String, String) -> Fut,
    Fut: Future<Output = Result<Option<ResolvedArtifact>, Error>>,
{
    let pending: Vec<(String, String, String)> = store
        .records()
        .map(|r| (r.key(), r.name.clone(), r.version.clone()))
        .collect();

    let results: Vec<(String, Result<Option<ResolvedArtifact>, Error>)> = stream::iter(pending)
        .map(|(key, name, version)| {
            let fut = lookup(name, version);
            async move { (key, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut stats = ResolveStats::default();
    let mut causes = Vec::new();

    for (key, result) in results {
        match result {
            Ok(Some(artifact)) => {
                debug!(%key, artifact = %artifact.id, "resolved dependency checksums");
                store.mark_resolved(&key, artifact);
                stats.resolved += 1;
            }
            Ok(None) => {
                debug!(%key, "dependency not found in the artifact repository");
                stats.missing += 1;
            }
            Err(e) => causes.push(e),
        }
    }

    if causes.is_empty() {
        Ok(stats)
    } else {
        Err(Error::Lookup { causes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildinfo::Checksum;
    use crate::npm::Scope;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn store_with(names: &[&str]) -> DependencyStore {
        let mut store = DependencyStore::new();
        for name in names {
            store.insert_or_merge(name, "1.0.0", Scope::Production);
        }
        store
    }

    fn artifact_for(name: &str, version: &str) -> ResolvedArtifact {
        ResolvedArtifact {
            id: format!("{name}-{version}.tgz"),
            checksum: Checksum {
                sha1: format!("sha1-{name}"),
                md5: format!("md5-{name}"),
            },
        }
    }

    fn snapshot(store: &DependencyStore) -> Vec<(String, Option<ResolvedArtifact>)> {
        store
            .records()
            .map(|r| (r.key(), r.artifact.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_all_resolved() {
        let mut store = store_with(&["a", "b", "c"]);
        let stats = resolve_checksums(&mut store, 3, |name, version| async move {
            Ok(Some(artifact_for(&name, &version)))
        })
        .await
        .unwrap();

        assert_eq!(stats, ResolveStats { resolved: 3, missing: 0 });
        assert!(store.records().all(|r| r.is_resolved()));
    }

    #[tokio::test]
    async fn test_order_independence() {
        let run = |concurrency: usize| async move {
            let mut store = store_with(&["a", "b", "c", "d", "e", "f", "g", "h"]);
            resolve_checksums(&mut store, concurrency, |name, version| async move {
                if name == "c" || name == "f" {
                    Ok(None)
                } else {
                    Ok(Some(artifact_for(&name, &version)))
                }
            })
            .await
            .unwrap();
            snapshot(&store)
        };

        let serial = run(1).await;
        let parallel = run(8).await;
        assert_eq!(serial, parallel);
    }

    #[tokio::test]
    async fn test_partial_failure_still_resolves_siblings() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        let err = resolve_checksums(&mut store, 2, |name, version| async move {
            if name == "b" {
                Err(Error::registry("index unavailable for b"))
            } else {
                Ok(Some(artifact_for(&name, &version)))
            }
        })
        .await
        .unwrap_err();

        match &err {
            Error::Lookup { causes } => assert_eq!(causes.len(), 1),
            other => panic!("expected aggregated lookup error, got {other}"),
        }
        assert!(err.to_string().contains("index unavailable for b"));

        // The three successful lookups landed despite the failure.
        assert!(store.get("a-1.0.0").unwrap().is_resolved());
        assert!(!store.get("b-1.0.0").unwrap().is_resolved());
        assert!(store.get("c-1.0.0").unwrap().is_resolved());
        assert!(store.get("d-1.0.0").unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_missing_leaves_record_unresolved() {
        let mut store = store_with(&["present", "absent"]);
        let stats = resolve_checksums(&mut store, 3, |name, version| async move {
            if name == "absent" {
                Ok(None)
            } else {
                Ok(Some(artifact_for(&name, &version)))
            }
        })
        .await
        .unwrap();

        assert_eq!(stats, ResolveStats { resolved: 1, missing: 1 });
        assert!(!store.get("absent-1.0.0").unwrap().is_resolved());
        let record = store.get("absent-1.0.0").unwrap();
        assert_eq!(record.scopes, BTreeSet::from([Scope::Production]));
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut store = store_with(&["a", "b", "c", "d", "e", "f"]);
        let bound = 2;
        resolve_checksums(&mut store, bound, |name, version| {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(artifact_for(&name, &version)))
            }
        })
        .await
        .unwrap();

        assert!(max_seen.load(Ordering::SeqCst) <= bound);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = DependencyStore::new();
        let stats = resolve_checksums(&mut store, 3, |_name, _version| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap();
        assert_eq!(stats, ResolveStats::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
