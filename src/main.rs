//! CLI entrypoint for pre-install package validation.

mod cache;
mod config;
mod deprecated;
mod providers;
mod scoring;
mod service;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use install_guard_core::Action;
use service::InstallGuardService;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "install-guard",
    version,
    about = "Pre-install compatibility and risk checks for npm packages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a single package before installing it
    Check {
        /// npm package name
        package: String,
        /// Project directory whose package.json is checked for peer compatibility
        #[arg(long)]
        path: Option<PathBuf>,
        /// Exit successfully even when the verdict is BLOCK
        #[arg(long)]
        force: bool,
        /// Enable debug logging on stderr
        #[arg(long)]
        verbose: bool,
    },
    /// Validate every dependency declared in a package.json
    CheckFile {
        /// Path to package.json
        manifest: PathBuf,
        /// Exit successfully even when a package is blocked
        #[arg(long)]
        force: bool,
        /// Enable debug logging on stderr
        #[arg(long)]
        verbose: bool,
    },
}

/// Returns risk factor factories wired into this application build.
pub(crate) fn app_factor_factories() -> Vec<install_guard_core::FactorFactory> {
    vec![
        install_guard_factor_compatibility::create_factor,
        install_guard_factor_security::create_factor,
        install_guard_factor_deprecation::create_factor,
        install_guard_factor_maintenance::create_factor,
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let (action, force) = match cli.command {
        Commands::Check {
            package,
            path,
            force,
            verbose,
        } => {
            init_tracing(verbose);
            let service = InstallGuardService::new()?;
            let result = service.validate_package(&package, path.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            (result.action, force)
        }
        Commands::CheckFile {
            manifest,
            force,
            verbose,
        } => {
            init_tracing(verbose);
            let service = InstallGuardService::new()?;
            let report = service.check_manifest(&manifest).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            (report.action, force)
        }
    };

    if blocks_install(action, force) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// stdout carries the JSON verdict; logs go to stderr.
fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();
}

fn blocks_install(action: Action, force: bool) -> bool {
    action == Action::Block && !force
}
