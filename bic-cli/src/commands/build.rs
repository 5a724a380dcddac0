//! `bic build`: build every changed package in dependency order.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::watch;

use bic_runner::{BuildOutcome, BuildReport, Orchestrator, RunSummary};

use crate::RunnerArg;

/// Arguments for `bic build`.
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Rebuild every participating package, changed or not.
    #[arg(short, long)]
    pub force: bool,

    /// Only print build errors.
    #[arg(short, long)]
    pub silent: bool,

    /// Glob of directories to leave out of discovery (repeatable).
    #[arg(long = "skip", value_name = "GLOB")]
    pub skip: Vec<String>,

    /// Tool that runs each package's build script.
    #[arg(long, value_name = "RUNNER")]
    pub runner: Option<RunnerArg>,

    /// Root directory to search (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl BuildArgs {
    pub async fn run(self) -> Result<ExitCode> {
        let mut opts = super::load_options(self.cwd)?
            .with_force(self.force)
            .with_silent(self.silent)
            .with_skip(self.skip);
        if let Some(runner) = self.runner {
            opts = opts.with_runner(runner.into());
        }
        let silent = opts.silent;
        let orchestrator = Orchestrator::new(opts);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping builds");
                let _ = cancel_tx.send(true);
            }
        });

        let summary = orchestrator
            .run_with(cancel_rx, |plan| {
                if !silent {
                    println!("📦  Building {} package(s)...", plan.changed().count());
                }
            })
            .await
            .context("failed to build packages")?;

        match summary {
            RunSummary::NoPackages if !silent => println!("⚠️  No packages were found."),
            RunSummary::NoChanges if !silent => println!("✨  No changes were found."),
            RunSummary::Built(report) if !report.is_success() => {
                print_failures(&report);
                return Ok(ExitCode::FAILURE);
            }
            RunSummary::Built(_) if !silent => println!("✨  Finished without errors."),
            _ => {}
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_failures(report: &BuildReport) {
    eprintln!("{}", "💥  Build failed. Check the logs above.".red().bold());
    for entry in &report.packages {
        match &entry.outcome {
            BuildOutcome::Failed { .. } => {
                eprintln!("  {} {}", entry.name.to_string().red().bold(), entry.outcome);
            }
            BuildOutcome::Aborted { .. } => {
                eprintln!("  {} {}", entry.name.to_string().yellow(), entry.outcome);
            }
            BuildOutcome::Skipped | BuildOutcome::Succeeded => {}
        }
    }
}
