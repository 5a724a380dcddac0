//! Discovery, change detection, and the scheduled build, end to end.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use bic_cache::{detect_all, Detection, FingerprintStore};
use bic_core::{find_packages, load_packages, Package, RunOptions};

use crate::error::RunError;
use crate::executor::Executor;
use crate::output::{ConsoleSink, OutputSink, Palette};
use crate::report::BuildReport;
use crate::scheduler::Scheduler;

/// A loaded package and its change classification.
#[derive(Debug, Clone)]
pub struct PlannedPackage {
    pub package: Package,
    pub detection: Detection,
}

impl PlannedPackage {
    pub fn is_changed(&self) -> bool {
        self.detection.signal.is_changed()
    }
}

/// Every package that survived discovery and detection, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Manifests found on disk, including ones that failed to load.
    pub discovered: usize,
    pub packages: Vec<PlannedPackage>,
}

impl Plan {
    pub fn changed(&self) -> impl Iterator<Item = &PlannedPackage> {
        self.packages.iter().filter(|p| p.is_changed())
    }

    /// The summary of a run that has nothing to build, or `None` when at
    /// least one package changed.
    pub fn idle_summary(&self) -> Option<RunSummary> {
        if self.discovered == 0 {
            Some(RunSummary::NoPackages)
        } else if self.changed().next().is_none() {
            Some(RunSummary::NoChanges)
        } else {
            None
        }
    }
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub enum RunSummary {
    NoPackages,
    NoChanges,
    Built(BuildReport),
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        match self {
            RunSummary::NoPackages | RunSummary::NoChanges => true,
            RunSummary::Built(report) => report.is_success(),
        }
    }
}

pub struct Orchestrator {
    opts: RunOptions,
    sink: Arc<dyn OutputSink>,
    palette: Arc<Palette>,
}

impl Orchestrator {
    /// Console output (stdout muted when `opts.silent`) and a colored palette.
    pub fn new(opts: RunOptions) -> Self {
        let sink = Arc::new(ConsoleSink {
            silent: opts.silent,
        });
        Self {
            opts,
            sink,
            palette: Arc::new(Palette::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Arc::new(palette);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// Discover, load, and classify every package without building anything.
    pub async fn plan(&self) -> Result<Plan, RunError> {
        let opts = self.opts.clone();
        let (discovered, packages) = tokio::task::spawn_blocking(move || {
            let manifests = find_packages(&opts)?;
            tracing::debug!(root = %opts.root.display(), count = manifests.len(), "found manifests");
            let packages = load_packages(&opts.root, &manifests, opts.runner);
            Ok::<_, RunError>((manifests.len(), packages))
        })
        .await
        .map_err(|e| RunError::Task(e.to_string()))??;

        let mut seen = HashSet::new();
        for pkg in &packages {
            if !seen.insert(pkg.name.clone()) {
                tracing::warn!(
                    package = %pkg.name,
                    path = %pkg.root.display(),
                    "duplicate package name; dependents resolve to the first one"
                );
            }
        }

        let planned = detect_all(packages, &self.opts)
            .await
            .into_iter()
            .filter_map(|(package, detection)| match detection {
                Ok(detection) => Some(PlannedPackage { package, detection }),
                Err(err) => {
                    tracing::warn!(package = %package.name, error = %err, "skipping package");
                    None
                }
            })
            .collect();
        Ok(Plan {
            discovered,
            packages: planned,
        })
    }

    /// Build the changed packages of `plan` in dependency order.
    pub async fn execute(
        &self,
        plan: Plan,
        cancel: watch::Receiver<bool>,
    ) -> Result<BuildReport, RunError> {
        let mut stores: HashMap<PathBuf, FingerprintStore> = HashMap::new();
        let mut changed: HashSet<PathBuf> = HashSet::new();
        let mut packages = Vec::with_capacity(plan.packages.len());
        for planned in plan.packages {
            if planned.is_changed() {
                changed.insert(planned.package.root.clone());
                stores.insert(planned.package.root.clone(), planned.detection.store);
            }
            packages.push(planned.package);
        }

        let scheduler = Scheduler::new(packages, |pkg| changed.contains(&pkg.root));
        let executor = Executor::new(self.sink.clone(), self.palette.clone());
        let stores = Arc::new(stores);
        let action = move |pkg: Arc<Package>| {
            let executor = executor.clone();
            let store = stores.get(&pkg.root).cloned();
            async move { executor.build(&pkg, store).await }
        };

        let report = scheduler.run(action, cancel).await?;
        for failed in report.failed() {
            tracing::debug!(package = %failed.name, outcome = %failed.outcome, "package failed");
        }
        Ok(report)
    }

    /// Plan, then build whatever changed.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<RunSummary, RunError> {
        self.run_with(cancel, |_| {}).await
    }

    /// Like [`Orchestrator::run`], calling `before_build` with the plan once
    /// it is known that something will be built.
    pub async fn run_with<F>(
        &self,
        cancel: watch::Receiver<bool>,
        before_build: F,
    ) -> Result<RunSummary, RunError>
    where
        F: FnOnce(&Plan),
    {
        let plan = self.plan().await?;
        if let Some(summary) = plan.idle_summary() {
            return Ok(summary);
        }
        before_build(&plan);
        let report = self.execute(plan, cancel).await?;
        Ok(RunSummary::Built(report))
    }
}
