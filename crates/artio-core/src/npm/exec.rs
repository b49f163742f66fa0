//! npm subprocess wrappers.

use crate::error::Error;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Minimum supported npm client, encoded as `major * 10 + minor`.
/// npm 5.4.0 is the first release whose merged config output is complete
/// enough to redirect.
const MIN_VERSION: u32 = 54;

/// Locate the npm executable on PATH.
pub fn find_npm() -> Result<PathBuf, Error> {
    let path = which::which("npm").map_err(|_| Error::NpmNotFound)?;
    debug!(npm = %path.display(), "found npm executable");
    Ok(path)
}

/// Query the npm client's dotted version string.
pub async fn npm_version(npm: &Path) -> Result<String, Error> {
    let output = Command::new(npm)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::npm("--version", e.to_string()))?;

    if !output.status.success() {
        return Err(Error::npm(
            "--version",
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Reject npm clients below the minimum supported version.
///
/// Only the first two dot-separated components matter, compared numerically
/// ("5.4.0" parses as major 5, minor 4; anything with
/// `major * 10 + minor < 54` is rejected).
pub fn validate_version(version: &str) -> Result<(), Error> {
    let unsupported = || Error::UnsupportedNpmVersion {
        version: version.to_string(),
    };

    let mut parts = version.trim().split('.');
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(unsupported)?;
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    if major * 10 + minor < MIN_VERSION {
        return Err(unsupported());
    }
    Ok(())
}

/// Run `npm config ls --json` with the pass-through args so flag overrides
/// surface in the merged configuration. Returns raw stdout bytes.
pub async fn config_list(npm: &Path, args: &[String], cwd: &Path) -> Result<Vec<u8>, Error> {
    let output = Command::new(npm)
        .args(["config", "ls", "--json"])
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::npm("config ls", e.to_string()))?;

    if !output.status.success() {
        return Err(Error::npm(
            "config ls",
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(output.stdout)
}

/// Run `npm install` with the filtered pass-through args, streaming its
/// output to the user.
pub async fn run_install(npm: &Path, args: &[String], cwd: &Path) -> Result<(), Error> {
    debug!(?args, "running npm install");
    let status = Command::new(npm)
        .arg("install")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::npm("install", e.to_string()))?;

    if !status.success() {
        return Err(Error::npm("install", format!("exited with {status}")));
    }
    Ok(())
}

/// Run `npm list --json` restricted to one scope.
///
/// Returns (stdout, stderr); non-empty stderr is advisory and left to the
/// caller to log. npm exits non-zero for tree problems (peer conflicts,
/// extraneous packages) while still printing a usable tree, so the exit
/// status is only fatal when no output was produced at all.
pub async fn list_tree(
    npm: &Path,
    args: &[String],
    scope: &str,
    cwd: &Path,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let output = Command::new(npm)
        .args(["list", "--json"])
        .args(args)
        .arg(format!("-only={scope}"))
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::npm("list", e.to_string()))?;

    if !output.status.success() && output.stdout.is_empty() {
        return Err(Error::npm(
            "list",
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok((output.stdout, output.stderr))
}

/// Keep only positional (non-flag) pass-through arguments for the install
/// invocation; flags were already folded into the redirected config.
#[must_use]
pub fn filter_positional_args(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|arg| !arg.starts_with('-'))
        .cloned()
        .collect()
}
