//! bic: build the packages of a monorepo whose files changed.
//!
//! # Usage
//!
//! ```text
//! bic [build] [-f|--force] [-s|--silent] [--skip GLOB]... [--runner auto|npm|yarn|pnpm|direct] [--cwd DIR]
//! bic status [--cwd DIR] [--json]
//! ```

mod commands;

use std::fmt;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bic_core::Runner;
use commands::{build::BuildArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bic",
    version,
    about = "Build only the packages whose files changed since their last successful build",
    long_about = None,
    args_conflicts_with_subcommands = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    build: BuildArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every changed package in dependency order (the default).
    Build(BuildArgs),

    /// Show which packages would build, without running anything.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Runner argument, parsed from CLI strings
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `Runner` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerArg(pub Runner);

impl FromStr for RunnerArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self(Runner::Auto)),
            "npm" => Ok(Self(Runner::Npm)),
            "yarn" => Ok(Self(Runner::Yarn)),
            "pnpm" => Ok(Self(Runner::Pnpm)),
            "direct" => Ok(Self(Runner::Direct)),
            other => Err(format!(
                "unknown runner '{other}'; expected: auto, npm, yarn, pnpm, direct"
            )),
        }
    }
}

impl fmt::Display for RunnerArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<RunnerArg> for Runner {
    fn from(r: RunnerArg) -> Self {
        r.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(silent: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if silent { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Build(args)) => {
            init_tracing(args.silent);
            args.run().await
        }
        Some(Commands::Status(args)) => {
            init_tracing(false);
            args.run().await
        }
        None => {
            init_tracing(cli.build.silent);
            cli.build.run().await
        }
    }
}
