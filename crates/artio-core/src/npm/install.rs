//! Install orchestration.
//!
//! A linear sequence with a compensating rollback around the install step:
//! prerequisites, `.npmrc` redirection, `npm install`, unconditional
//! restore, then (when build-info collection is enabled) dependency
//! discovery, checksum resolution and manifest persistence.

use super::exec;
use super::npmrc::{self, NpmrcGuard};
use super::resolver::{self, DEFAULT_CONCURRENCY};
use super::store::{DependencyStore, Scope};
use super::tree;
use crate::buildinfo;
use crate::client::RepoClient;
use crate::config::ServerConfig;
use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One npm-install run. Constructed once per invocation and threaded
/// through every stage; there is no process-wide state.
#[derive(Debug)]
pub struct NpmInstall {
    repo: String,
    server: ServerConfig,
    working_dir: PathBuf,
    npm_args: Vec<String>,
    build: Option<(String, String)>,
    concurrency: usize,
}

/// What a completed run produced.
#[derive(Debug, Default)]
pub struct NpmInstallOutcome {
    /// Whether a build-info partial was persisted.
    pub build_info_collected: bool,
    /// Number of dependencies resolved against the repository.
    pub resolved: usize,
    /// Identity keys (`name-version`) absent from the repository.
    pub missing: Vec<String>,
}

impl NpmInstall {
    #[must_use]
    pub fn new(repo: impl Into<String>, server: ServerConfig, working_dir: &Path) -> Self {
        Self {
            repo: repo.into(),
            server,
            working_dir: working_dir.to_path_buf(),
            npm_args: Vec::new(),
            build: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Pass-through arguments for the underlying npm commands.
    #[must_use]
    pub fn with_npm_args(mut self, args: Vec<String>) -> Self {
        self.npm_args = args;
        self
    }

    /// Enable build-info collection for the given build name and number.
    #[must_use]
    pub fn with_build(mut self, name: impl Into<String>, number: impl Into<String>) -> Self {
        self.build = Some((name.into(), number.into()));
        self
    }

    /// Override the checksum-lookup concurrency bound.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Run the full install sequence.
    pub async fn run(self) -> Result<NpmInstallOutcome, Error> {
        info!(repo = %self.repo, "running npm install through the artifact repository");

        // Prerequisites: nothing has been changed yet, failures are terminal
        // with no rollback.
        let npm = exec::find_npm()?;
        let npm_version = exec::npm_version(&npm).await?;
        exec::validate_version(&npm_version)?;
        if self.server.uses_ssh_auth() {
            return Err(Error::UnsupportedAuth);
        }

        let client = RepoClient::new(&self.server)?;
        let npm_auth = client.npm_auth().await?;
        let registry = self.server.npm_repository_url(&self.repo);
        debug!(%registry, "redirecting npm resolution");

        let mut collect_build_info = self.build.is_some();
        if let Some((name, number)) = &self.build {
            buildinfo::save_build_general_details(name, number)?;
        }

        // Guarded .npmrc swap: the restore below runs on every exit path.
        let guard = NpmrcGuard::backup(&self.working_dir)?;
        let install_result = self
            .redirect_and_install(&npm, &guard, &registry, &npm_auth, &mut collect_build_info)
            .await;

        let restriction = match install_result {
            Ok(restriction) => {
                guard.restore()?;
                restriction
            }
            Err(cause) => {
                return Err(match guard.restore() {
                    Ok(()) => cause,
                    Err(restore) => Error::RestoreFailed {
                        restore: Box::new(restore),
                        cause: Box::new(cause),
                    },
                });
            }
        };

        let (build_name, build_number) = match &self.build {
            Some((name, number)) if collect_build_info => (name.clone(), number.clone()),
            _ => {
                info!("npm install finished successfully");
                return Ok(NpmInstallOutcome::default());
            }
        };

        let mut store = DependencyStore::new();
        self.discover_dependencies(&npm, restriction, &mut store)
            .await?;
        debug!(dependencies = store.len(), "dependency discovery finished");

        let stats = resolver::resolve_checksums(&mut store, self.concurrency, |name, version| {
            let client = client.clone();
            async move { client.find_npm_artifact(&name, &version).await }
        })
        .await?;
        debug!(
            resolved = stats.resolved,
            missing = stats.missing,
            "checksum resolution finished"
        );

        let (dependencies, missing) = buildinfo::partition(&store);
        buildinfo::save_partial(&build_name, &build_number, &dependencies)?;

        if !missing.is_empty() {
            warn!(
                "some dependencies could not be found in the artifact repository and are not \
                 included in the build-info. Moving aside node_modules and the npm cache and \
                 rerunning will force npm to download them through the repository. Missing:\n{}",
                missing.join("\n")
            );
        }

        info!("npm install finished successfully");
        Ok(NpmInstallOutcome {
            build_info_collected: true,
            resolved: dependencies.len(),
            missing,
        })
    }

    /// Write the redirected config and run the install itself. Any error
    /// from here triggers the caller's restore-then-report path.
    async fn redirect_and_install(
        &self,
        npm: &Path,
        guard: &NpmrcGuard,
        registry: &str,
        npm_auth: &str,
        collect_build_info: &mut bool,
    ) -> Result<Option<Scope>, Error> {
        let config_output = exec::config_list(npm, &self.npm_args, &self.working_dir).await?;
        let (config_data, restriction) =
            npmrc::prepare_config_data(&config_output, registry, npm_auth)?;
        guard.write(&config_data)?;

        let positionals = exec::filter_positional_args(&self.npm_args);
        if *collect_build_info && !positionals.is_empty() {
            // Documented limitation: extra install arguments change what npm
            // resolves, so the collected tree could not be trusted.
            warn!(
                "build-info collection with extra npm install arguments is not supported; \
                 skipping build-info collection"
            );
            *collect_build_info = false;
        }

        exec::run_install(npm, &positionals, &self.working_dir).await?;
        Ok(restriction)
    }

    /// Parse the resolved tree once per applicable scope.
    async fn discover_dependencies(
        &self,
        npm: &Path,
        restriction: Option<Scope>,
        store: &mut DependencyStore,
    ) -> Result<(), Error> {
        for scope in scopes_to_parse(restriction) {
            self.discover_scope(npm, scope, store).await?;
        }
        Ok(())
    }

    async fn discover_scope(
        &self,
        npm: &Path,
        scope: Scope,
        store: &mut DependencyStore,
    ) -> Result<(), Error> {
        let (stdout, stderr) =
            exec::list_tree(npm, &self.npm_args, scope.as_str(), &self.working_dir).await?;
        if !stderr.is_empty() {
            warn!(
                %scope,
                "npm reported problems while listing dependencies:\n{}",
                String::from_utf8_lossy(&stderr)
            );
        }
        tree::collect_dependencies(&stdout, scope, store)
    }
}

/// A "production" restriction skips the development pass and vice versa;
/// no restriction runs both.
fn scopes_to_parse(restriction: Option<Scope>) -> Vec<Scope> {
    match restriction {
        Some(Scope::Production) => vec![Scope::Production],
        Some(Scope::Development) => vec![Scope::Development],
        None => vec![Scope::Development, Scope::Production],
    }
}
