#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "artio")]
#[command(author, version, about = "npm install through an artifact repository with build-info collection", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted logs (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Run npm install with resolution redirected through a repository
    NpmInstall {
        /// Target repository on the artifact service (e.g. "npm-virtual")
        repo: String,

        /// Base URL of the artifact service
        #[arg(long, env = "ARTIO_URL")]
        url: String,

        /// Access token for the artifact service
        #[arg(long, env = "ARTIO_ACCESS_TOKEN")]
        access_token: Option<String>,

        /// Username for basic auth
        #[arg(long, env = "ARTIO_USER", conflicts_with = "access_token")]
        user: Option<String>,

        /// Password for basic auth
        #[arg(long, env = "ARTIO_PASSWORD", requires = "user")]
        password: Option<String>,

        /// SSH key path (rejected: only token/basic auth can redirect npm)
        #[arg(long)]
        ssh_key_path: Option<PathBuf>,

        /// Build name for build-info collection
        #[arg(long)]
        build_name: Option<String>,

        /// Build number for build-info collection
        #[arg(long, requires = "build_name")]
        build_number: Option<String>,

        /// Number of concurrent checksum lookups
        #[arg(long, default_value_t = artio_core::npm::DEFAULT_CONCURRENCY)]
        threads: usize,

        /// Arguments to pass through to npm (after --)
        #[arg(last = true)]
        npm_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Version => {
            println!("artio {}", artio_core::VERSION);
            Ok(())
        }
        Commands::NpmInstall {
            repo,
            url,
            access_token,
            user,
            password,
            ssh_key_path,
            build_name,
            build_number,
            threads,
            npm_args,
        } => commands::npm_install::run(&commands::npm_install::Args {
            repo,
            url,
            access_token,
            user,
            password,
            ssh_key_path,
            build_name,
            build_number,
            threads,
            npm_args,
            cwd,
        }),
    }
}
