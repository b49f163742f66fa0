use artio_core::{Credentials, NpmInstall, ServerConfig};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

/// Parsed arguments for the npm-install command.
#[derive(Debug)]
pub struct Args {
    pub repo: String,
    pub url: String,
    pub access_token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
    pub build_name: Option<String>,
    pub build_number: Option<String>,
    pub threads: usize,
    pub npm_args: Vec<String>,
    pub cwd: PathBuf,
}

pub fn run(args: &Args) -> Result<()> {
    let credentials = credentials_from(args);
    let server = ServerConfig::new(args.url.clone(), credentials);

    let mut install = NpmInstall::new(args.repo.clone(), server, &args.cwd)
        .with_npm_args(args.npm_args.clone())
        .with_concurrency(args.threads);

    if let (Some(name), Some(number)) = (&args.build_name, &args.build_number) {
        install = install.with_build(name.clone(), number.clone());
    }

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    let outcome = rt.block_on(install.run()).into_diagnostic()?;

    if outcome.build_info_collected {
        info!(
            resolved = outcome.resolved,
            missing = outcome.missing.len(),
            "build-info partial saved"
        );
        if !outcome.missing.is_empty() {
            println!(
                "Dependencies missing from the repository:\n{}",
                outcome.missing.join("\n")
            );
        }
    }
    Ok(())
}

/// SSH wins so the core can reject it with its own error; token beats
/// basic auth, matching the clap conflict rules.
fn credentials_from(args: &Args) -> Credentials {
    if let Some(key_path) = &args.ssh_key_path {
        return Credentials::Ssh {
            key_path: key_path.clone(),
        };
    }
    if let Some(token) = &args.access_token {
        return Credentials::AccessToken(token.clone());
    }
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        return Credentials::Basic {
            user: user.clone(),
            password: password.clone(),
        };
    }
    Credentials::Anonymous
}
