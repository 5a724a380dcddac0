use thiserror::Error;

use bic_core::{CoreError, PackageName};

/// Scheduling failures detected before any build action runs.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("dependency cycle detected: {}", render_cycle(cycle))]
    Cycle { cycle: Vec<PackageName> },
}

/// Error surface of a whole build run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("discovery error: {0}")]
    Discovery(#[from] CoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("background task failed: {0}")]
    Task(String),
}

fn render_cycle(cycle: &[PackageName]) -> String {
    cycle
        .iter()
        .map(|name| name.0.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
