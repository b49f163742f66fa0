#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]

pub mod buildinfo;
pub mod client;
pub mod config;
pub mod error;
pub mod npm;

pub use client::RepoClient;
pub use config::{Credentials, ServerConfig};
pub use error::Error;
pub use npm::{NpmInstall, NpmInstallOutcome};

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
