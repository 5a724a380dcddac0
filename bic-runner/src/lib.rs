//! Build execution: dependency scheduling, child processes, and the
//! end-to-end orchestrator.

mod error;
pub mod executor;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod scheduler;

pub use error::{RunError, ScheduleError};
pub use executor::Executor;
pub use orchestrator::{Orchestrator, Plan, PlannedPackage, RunSummary};
pub use output::{ConsoleSink, MemorySink, OutputSink, Palette, Stream};
pub use report::{AbortCause, BuildOutcome, BuildReport, PackageOutcome};
pub use scheduler::Scheduler;
