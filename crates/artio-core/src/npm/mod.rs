//! npm install through the artifact repository.
//!
//! Provides:
//! - An in-memory dependency store with idempotent scope merging
//! - Resolved-tree parsing from `npm list --json` output
//! - Bounded-concurrency checksum resolution against the repository
//! - `.npmrc` redirection with guaranteed backup/restore
//! - npm subprocess wrappers (version gate, config, install, list)
//! - The install orchestrator tying the stages together

pub mod exec;
pub mod install;
pub mod npmrc;
pub mod resolver;
pub mod store;
pub mod tree;

pub use exec::{filter_positional_args, find_npm, validate_version};
pub use install::{NpmInstall, NpmInstallOutcome};
pub use npmrc::{prepare_config_data, NpmrcGuard, NPMRC_BACKUP_FILE, NPMRC_FILE};
pub use resolver::{resolve_checksums, ResolveStats, DEFAULT_CONCURRENCY};
pub use store::{dependency_key, DependencyRecord, DependencyStore, ResolvedArtifact, Scope};
pub use tree::collect_dependencies;
