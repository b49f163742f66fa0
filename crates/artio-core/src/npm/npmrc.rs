//! Project `.npmrc` redirection.
//!
//! To make npm resolve through the artifact repository, the project's
//! `.npmrc` is replaced for the duration of the install: any existing file
//! is copied aside (preserving its permission bits), a redirected config is
//! written in its place, and the original is put back on every exit path.
//!
//! The redirected config carries every valid key from the merged npm
//! configuration, with the registry (and every scoped registry) pointed at
//! the repository and the repository's npm auth block appended last.

use super::store::Scope;
use crate::error::Error;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name of npm's per-project configuration file.
pub const NPMRC_FILE: &str = ".npmrc";

/// Where an existing `.npmrc` is parked while the install runs.
pub const NPMRC_BACKUP_FILE: &str = "artio.npmrc.backup";

/// Permission bits used when the project had no `.npmrc` of its own.
const DEFAULT_MODE: u32 = 0o644;

/// Guarded `.npmrc` swap: acquire with [`NpmrcGuard::backup`], release with
/// [`NpmrcGuard::restore`]. Restore must run on every exit path, including
/// install failure.
#[derive(Debug)]
pub struct NpmrcGuard {
    project_dir: PathBuf,
    mode: u32,
}

impl NpmrcGuard {
    /// Copy an existing project `.npmrc` aside, remembering its permission
    /// bits. A missing file is fine; the default mode applies.
    pub fn backup(project_dir: &Path) -> Result<Self, Error> {
        let npmrc = project_dir.join(NPMRC_FILE);
        let mode = match fs::metadata(&npmrc) {
            Err(e) if e.kind() == ErrorKind::NotFound => DEFAULT_MODE,
            Err(e) => {
                return Err(Error::ConfigIo {
                    action: "inspect",
                    path: npmrc,
                    source: e,
                })
            }
            Ok(meta) => {
                let mode = permission_bits(&meta).unwrap_or(DEFAULT_MODE);
                copy_with_mode(&npmrc, &project_dir.join(NPMRC_BACKUP_FILE), mode)?;
                mode
            }
        };

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            mode,
        })
    }

    /// Write the redirected config, replacing any existing `.npmrc`.
    pub fn write(&self, content: &[u8]) -> Result<(), Error> {
        let npmrc = self.project_dir.join(NPMRC_FILE);
        remove_if_exists(&npmrc)?;
        fs::write(&npmrc, content).map_err(|e| Error::ConfigIo {
            action: "write",
            path: npmrc.clone(),
            source: e,
        })?;
        set_permission_bits(&npmrc, self.mode)
    }

    /// Delete the redirected file and put any backup back in place.
    ///
    /// Deleting an already-missing redirected file is not an error; after a
    /// successful restore no backup file remains.
    pub fn restore(&self) -> Result<(), Error> {
        let npmrc = self.project_dir.join(NPMRC_FILE);
        remove_if_exists(&npmrc)?;

        let backup = self.project_dir.join(NPMRC_BACKUP_FILE);
        match fs::metadata(&backup) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::ConfigIo {
                action: "inspect",
                path: backup,
                source: e,
            }),
            Ok(meta) => {
                let mode = permission_bits(&meta).unwrap_or(DEFAULT_MODE);
                copy_with_mode(&backup, &npmrc, mode)?;
                remove_if_exists(&backup)
            }
        }
    }
}

/// Render the redirected `.npmrc` content from `npm config ls --json`
/// output, and detect any install type restriction present in the merged
/// configuration (`--production`, `-only=prod...`, `-only=dev...`).
///
/// Rendering rules:
/// - every valid key=value pair is kept as `key = value`;
/// - keys starting with `//` or `@`, the `registry`/`metrics-registry`
///   keys, and null/empty values are dropped;
/// - every `@scope` key is rewritten to point at `registry_url`;
/// - `registry = <registry_url>` is appended, then the opaque auth block,
///   verbatim, last.
pub fn prepare_config_data(
    merged_config_json: &[u8],
    registry_url: &str,
    npm_auth: &str,
) -> Result<(Vec<u8>, Option<Scope>), Error> {
    let config: serde_json::Map<String, Value> = serde_json::from_slice(merged_config_json)
        .map_err(|e| Error::npm("config ls", format!("unexpected JSON output: {e}")))?;

    let mut out = String::new();
    let mut restriction = None;

    for (key, value) in &config {
        if is_valid_key_val(key, value) {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&render_value(value));
            out.push('\n');
        } else if key.starts_with('@') {
            // Scoped registries also route through the repository.
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(registry_url);
            out.push('\n');
        }

        if let Some(scope) = type_restriction(key, value) {
            restriction = Some(scope);
        }
    }

    out.push_str("registry = ");
    out.push_str(registry_url);
    out.push('\n');
    out.push_str(npm_auth);

    Ok((out.into_bytes(), restriction))
}

/// Valid keys are unrelated to registries (plain or scoped), carry no
/// credential prefix, and have data in their value.
fn is_valid_key_val(key: &str, value: &Value) -> bool {
    !key.starts_with("//")
        && !key.starts_with('@')
        && key != "registry"
        && key != "metrics-registry"
        && !value.is_null()
        && value.as_str() != Some("")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The install type restriction can be set with `--production` or
/// `-only={prod[uction]|dev[elopment]}`; both surface in the merged config.
fn type_restriction(key: &str, value: &Value) -> Option<Scope> {
    match key {
        "production" if value == &Value::Bool(true) || value.as_str() == Some("true") => {
            Some(Scope::Production)
        }
        "only" => {
            let only = value.as_str()?;
            if only.contains("prod") {
                Some(Scope::Production)
            } else if only.contains("dev") {
                Some(Scope::Development)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn remove_if_exists(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::ConfigIo {
            action: "delete",
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_with_mode(from: &Path, to: &Path, mode: u32) -> Result<(), Error> {
    fs::copy(from, to).map_err(|e| Error::ConfigIo {
        action: "copy",
        path: from.to_path_buf(),
        source: e,
    })?;
    set_permission_bits(to, mode)
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_permission_bits(path: &Path, mode: u32) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::ConfigIo {
        action: "set permissions on",
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn set_permission_bits(_path: &Path, _mode: u32) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(json: &str, registry: &str, auth: &str) -> (String, Option<Scope>) {
        let (bytes, restriction) =
            prepare_config_data(json.as_bytes(), registry, auth).unwrap();
        (String::from_utf8(bytes).unwrap(), restriction)
    }

    const REGISTRY: &str = "https://repo.example.com/api/npm/npm-virtual";

    #[test]
    fn test_valid_pairs_rendered() {
        let (out, _) = prepare(
            r#"{"cache": "/home/user/.npm", "save-prefix": "^", "loglevel": "warn"}"#,
            REGISTRY,
            "",
        );
        assert!(out.contains("cache = /home/user/.npm\n"));
        assert!(out.contains("save-prefix = ^\n"));
        assert!(out.contains("loglevel = warn\n"));
    }

    #[test]
    fn test_filtered_keys_dropped() {
        let (out, _) = prepare(
            r#"{
                "//registry.npmjs.org/:_authToken": "secret",
                "registry": "https://registry.npmjs.org/",
                "metrics-registry": "https://registry.npmjs.org/",
                "empty": "",
                "nothing": null,
                "kept": "yes"
            }"#,
            REGISTRY,
            "",
        );
        assert!(!out.contains("secret"));
        assert!(!out.contains("registry.npmjs.org"));
        assert!(!out.contains("metrics-registry"));
        assert!(!out.contains("empty"));
        assert!(!out.contains("nothing"));
        assert!(out.contains("kept = yes\n"));
    }

    #[test]
    fn test_scoped_registries_redirected() {
        let (out, _) = prepare(
            r#"{"@myorg": "https://npm.pkg.github.com/"}"#,
            REGISTRY,
            "",
        );
        assert!(out.contains(&format!("@myorg = {REGISTRY}\n")));
        assert!(!out.contains("npm.pkg.github.com"));
    }

    #[test]
    fn test_registry_line_and_auth_block_last() {
        let auth = "_auth = dXNlcjpwYXNz\nalways-auth = true\nemail = ci@example.com\n";
        let (out, _) = prepare(r#"{"loglevel": "warn"}"#, REGISTRY, auth);
        let registry_line = format!("registry = {REGISTRY}\n");
        assert!(out.contains(&registry_line));
        // Auth block is appended verbatim after the registry line.
        assert!(out.ends_with(auth));
        let registry_at = out.find(&registry_line).unwrap();
        let auth_at = out.rfind(auth).unwrap();
        assert!(registry_at < auth_at);
    }

    #[test]
    fn test_non_string_values_rendered() {
        let (out, _) = prepare(r#"{"save": true, "maxsockets": 50}"#, REGISTRY, "");
        assert!(out.contains("save = true\n"));
        assert!(out.contains("maxsockets = 50\n"));
    }

    #[test]
    fn test_production_restriction_detected() {
        let (_, restriction) = prepare(r#"{"production": true}"#, REGISTRY, "");
        assert_eq!(restriction, Some(Scope::Production));

        let (_, restriction) = prepare(r#"{"production": "true"}"#, REGISTRY, "");
        assert_eq!(restriction, Some(Scope::Production));

        let (_, restriction) = prepare(r#"{"production": false}"#, REGISTRY, "");
        assert_eq!(restriction, None);
    }

    #[test]
    fn test_only_restriction_detected() {
        let (_, restriction) = prepare(r#"{"only": "prod"}"#, REGISTRY, "");
        assert_eq!(restriction, Some(Scope::Production));

        let (_, restriction) = prepare(r#"{"only": "development"}"#, REGISTRY, "");
        assert_eq!(restriction, Some(Scope::Development));

        let (_, restriction) = prepare(r#"{"only": null}"#, REGISTRY, "");
        assert_eq!(restriction, None);
    }

    #[test]
    fn test_invalid_config_json_is_an_error() {
        let err = prepare_config_data(b"not json", REGISTRY, "").unwrap_err();
        assert!(matches!(err, Error::Npm { .. }));
    }

    #[test]
    fn test_guard_roundtrip_restores_content() {
        let dir = tempfile::tempdir().unwrap();
        let npmrc = dir.path().join(NPMRC_FILE);
        fs::write(&npmrc, "original = content\n").unwrap();

        let guard = NpmrcGuard::backup(dir.path()).unwrap();
        guard.write(b"registry = https://redirected/\n").unwrap();
        assert_eq!(
            fs::read_to_string(&npmrc).unwrap(),
            "registry = https://redirected/\n"
        );

        guard.restore().unwrap();
        assert_eq!(fs::read_to_string(&npmrc).unwrap(), "original = content\n");
        assert!(!dir.path().join(NPMRC_BACKUP_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_roundtrip_restores_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let npmrc = dir.path().join(NPMRC_FILE);
        fs::write(&npmrc, "token = shhh\n").unwrap();
        fs::set_permissions(&npmrc, fs::Permissions::from_mode(0o600)).unwrap();

        let guard = NpmrcGuard::backup(dir.path()).unwrap();
        guard.write(b"redirected\n").unwrap();
        let redirected_mode = fs::metadata(&npmrc).unwrap().permissions().mode() & 0o777;
        assert_eq!(redirected_mode, 0o600);

        guard.restore().unwrap();
        let mode = fs::metadata(&npmrc).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_guard_without_preexisting_npmrc() {
        let dir = tempfile::tempdir().unwrap();

        let guard = NpmrcGuard::backup(dir.path()).unwrap();
        assert!(!dir.path().join(NPMRC_BACKUP_FILE).exists());

        guard.write(b"redirected\n").unwrap();
        guard.restore().unwrap();
        // No original, so the directory ends up empty again.
        assert!(!dir.path().join(NPMRC_FILE).exists());
        assert!(!dir.path().join(NPMRC_BACKUP_FILE).exists());
    }

    #[test]
    fn test_restore_tolerates_missing_redirected_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = NpmrcGuard::backup(dir.path()).unwrap();
        // Nothing was ever written; restore is still clean.
        guard.restore().unwrap();
    }
}
