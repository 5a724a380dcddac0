//! `bic status`: change classification for every package, no builds.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use bic_cache::{detect::format_datetime_age, fingerprint, ChangeSignal};
use bic_runner::{Orchestrator, Plan};

/// Arguments for `bic status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Root directory to search (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub async fn run(self) -> Result<ExitCode> {
        let opts = super::load_options(self.cwd)?;
        let root = opts.root.clone();
        let plan = Orchestrator::new(opts)
            .plan()
            .await
            .context("failed to scan packages")?;

        let rows = build_rows(&root, &plan);
        if self.json {
            print_json(rows)?;
        } else {
            print_table(rows);
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Clone, Serialize)]
struct PackageStatus {
    name: String,
    path: String,
    status: &'static str,
    changed: bool,
    detail: String,
    last_build_age: String,
    last_build_at: Option<String>,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    packages: Vec<PackageStatus>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    packages: usize,
    changed: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "package")]
    name: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "last build")]
    last_build: String,
}

fn build_rows(root: &Path, plan: &Plan) -> Vec<PackageStatus> {
    plan.packages
        .iter()
        .map(|planned| {
            let pkg = &planned.package;
            let signal = &planned.detection.signal;
            let (last_build_at, last_build_age) = match fingerprint::load_at(&pkg.root) {
                Some(store) => (
                    Some(store.built_at.to_rfc3339()),
                    format_datetime_age(store.built_at),
                ),
                None => (None, "never".to_string()),
            };
            let path = pkg
                .root
                .strip_prefix(root)
                .map(|rel| rel.display().to_string())
                .unwrap_or_else(|_| pkg.root.display().to_string());
            PackageStatus {
                name: pkg.name.to_string(),
                path: if path.is_empty() { ".".to_string() } else { path },
                status: signal_key(signal),
                changed: signal.is_changed(),
                detail: signal_detail(signal),
                last_build_age,
                last_build_at,
            }
        })
        .collect()
}

fn print_json(rows: Vec<PackageStatus>) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            packages: rows.len(),
            changed: rows.iter().filter(|r| r.changed).count(),
        },
        packages: rows,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(rows: Vec<PackageStatus>) {
    if rows.is_empty() {
        println!("⚠️  No packages were found.");
        return;
    }
    let changed = rows.iter().filter(|r| r.changed).count();
    println!(
        "bic v{} | {} packages | {} to build",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        changed,
    );

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            status: colorize(row.status, row.changed),
            name: row.name,
            path: row.path,
            detail: row.detail,
            last_build: row.last_build_age,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if changed > 0 {
        println!("Run 'bic' to build the changed packages.");
    }
}

fn colorize(key: &str, changed: bool) -> String {
    let label = key.replace('_', " ").to_uppercase();
    if changed {
        label.yellow().bold().to_string()
    } else if key == "current" {
        label.green().to_string()
    } else {
        label.bright_black().to_string()
    }
}

fn signal_key(signal: &ChangeSignal) -> &'static str {
    match signal {
        ChangeSignal::Bypassed { .. } => "bypassed",
        ChangeSignal::NeverBuilt => "never_built",
        ChangeSignal::Modified { .. } => "modified",
        ChangeSignal::Forced => "forced",
        ChangeSignal::Current => "current",
    }
}

fn signal_detail(signal: &ChangeSignal) -> String {
    match signal {
        ChangeSignal::Bypassed { reason } => reason.to_string(),
        ChangeSignal::NeverBuilt => "no cache file".to_string(),
        ChangeSignal::Modified { files } => format!("{} changed", summarize_files(files)),
        ChangeSignal::Forced => "always rebuilt".to_string(),
        ChangeSignal::Current => "up to date".to_string(),
    }
}

fn summarize_files(files: &[String]) -> String {
    match files {
        [] => "no files".to_string(),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{first} and {} more", rest.len()),
    }
}
