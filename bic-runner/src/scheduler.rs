//! Dependency-ordered execution of build actions.
//!
//! Every package known to the run becomes a node; edges come from declared
//! dependencies that resolve to another known package. Each node reachable
//! from the scheduled set gets one memoized completion future, so an action
//! runs at most once and only after all of its dependencies completed.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use bic_core::{DependencyRef, Package, PackageName};

use crate::error::ScheduleError;
use crate::report::{AbortCause, BuildOutcome, BuildReport, PackageOutcome};

struct Node {
    package: Arc<Package>,
    scheduled: bool,
    deps: Vec<usize>,
}

/// How a node's completion looks to its dependents.
#[derive(Debug, Clone)]
enum Completion {
    Done,
    /// Carries the package whose own build failed.
    Failed(PackageName),
    Cancelled,
}

#[derive(Debug, Clone)]
struct NodeOutput {
    completion: Completion,
    outcome: Option<BuildOutcome>,
}

type NodeFuture = Shared<BoxFuture<'static, NodeOutput>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

pub struct Scheduler {
    nodes: Vec<Node>,
}

impl Scheduler {
    /// Build the graph over `packages`. `is_scheduled` selects the packages
    /// whose action should run; the rest only pass completion through.
    pub fn new(packages: Vec<Package>, mut is_scheduled: impl FnMut(&Package) -> bool) -> Self {
        let mut by_name: HashMap<PackageName, usize> = HashMap::new();
        let mut by_root: HashMap<PathBuf, usize> = HashMap::new();
        for (idx, pkg) in packages.iter().enumerate() {
            by_name.entry(pkg.name.clone()).or_insert(idx);
            by_root.entry(pkg.root.clone()).or_insert(idx);
        }

        let nodes = packages
            .iter()
            .map(|pkg| {
                let mut deps = Vec::new();
                for dep in &pkg.dependencies {
                    let target = match &dep.reference {
                        DependencyRef::Path(path) => by_root.get(path),
                        DependencyRef::Registry(_) => by_name.get(&dep.name),
                    };
                    match target {
                        Some(&idx) if !deps.contains(&idx) => deps.push(idx),
                        Some(_) => {}
                        None => tracing::trace!(
                            package = %pkg.name,
                            dependency = %dep.name,
                            "dependency is external to the run"
                        ),
                    }
                }
                (pkg, deps)
            })
            .map(|(pkg, deps)| Node {
                scheduled: is_scheduled(pkg),
                package: Arc::new(pkg.clone()),
                deps,
            })
            .collect();

        Self { nodes }
    }

    /// Topological order of every node reachable from the scheduled set,
    /// dependencies first.
    pub fn plan(&self) -> Result<Vec<usize>, ScheduleError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::new();
        let mut path = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.scheduled {
                self.visit(idx, &mut marks, &mut path, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        idx: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ScheduleError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::OnPath => {
                let start = path.iter().position(|&p| p == idx).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&idx))
                    .map(|&p| self.nodes[p].package.name.clone())
                    .collect();
                return Err(ScheduleError::Cycle { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[idx] = Mark::OnPath;
        path.push(idx);
        for &dep in &self.nodes[idx].deps {
            self.visit(dep, marks, path, order)?;
        }
        path.pop();
        marks[idx] = Mark::Done;
        order.push(idx);
        Ok(())
    }

    /// Run `action` once per scheduled package, in dependency order.
    ///
    /// Packages that are not scheduled are reported as `Skipped`. When a
    /// dependency fails, dependents are `Aborted` without running. Setting
    /// `cancel` to `true` aborts everything pending and drops running actions.
    pub async fn run<F, Fut>(
        &self,
        action: F,
        cancel: watch::Receiver<bool>,
    ) -> Result<BuildReport, ScheduleError>
    where
        F: Fn(Arc<Package>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BuildOutcome> + Send + 'static,
    {
        let order = self.plan()?;
        let action = Arc::new(action);

        let mut futures: Vec<Option<NodeFuture>> = vec![None; self.nodes.len()];
        for &idx in &order {
            let node = &self.nodes[idx];
            let deps: Vec<NodeFuture> = node
                .deps
                .iter()
                .filter_map(|&dep| futures[dep].clone())
                .collect();
            let future = complete(
                node.package.clone(),
                node.scheduled,
                deps,
                action.clone(),
                cancel.clone(),
            )
            .boxed()
            .shared();
            futures[idx] = Some(future);
        }

        let outputs = join_all(futures.iter().map(|future| {
            let future = future.clone();
            async move {
                match future {
                    Some(future) => Some(future.await),
                    None => None,
                }
            }
        }))
        .await;

        let packages = self
            .nodes
            .iter()
            .zip(outputs)
            .map(|(node, output)| PackageOutcome {
                name: node.package.name.clone(),
                root: node.package.root.clone(),
                scheduled: node.scheduled,
                outcome: output
                    .and_then(|output| output.outcome)
                    .unwrap_or(BuildOutcome::Skipped),
            })
            .collect();
        Ok(BuildReport { packages })
    }
}

async fn complete<F, Fut>(
    package: Arc<Package>,
    scheduled: bool,
    deps: Vec<NodeFuture>,
    action: Arc<F>,
    cancel: watch::Receiver<bool>,
) -> NodeOutput
where
    F: Fn(Arc<Package>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BuildOutcome> + Send + 'static,
{
    let upstream = join_all(deps).await;

    let failed = upstream.iter().find_map(|dep| match &dep.completion {
        Completion::Failed(root) => Some(root.clone()),
        _ => None,
    });
    if let Some(root) = failed {
        tracing::debug!(package = %package.name, failed = %root, "dependency failed, not building");
        return NodeOutput {
            completion: Completion::Failed(root.clone()),
            outcome: scheduled.then(|| BuildOutcome::Aborted {
                cause: AbortCause::Dependency { package: root },
            }),
        };
    }
    if upstream
        .iter()
        .any(|dep| matches!(dep.completion, Completion::Cancelled))
    {
        return cancelled_output(scheduled);
    }

    if !scheduled {
        return NodeOutput {
            completion: Completion::Done,
            outcome: None,
        };
    }

    let already_cancelled = *cancel.borrow();
    if already_cancelled {
        return cancelled_output(true);
    }

    let outcome = tokio::select! {
        biased;
        () = wait_cancelled(cancel) => {
            tracing::debug!(package = %package.name, "build cancelled");
            return cancelled_output(true);
        }
        outcome = action(package.clone()) => outcome,
    };

    let completion = match &outcome {
        BuildOutcome::Skipped | BuildOutcome::Succeeded => Completion::Done,
        BuildOutcome::Failed { .. } => Completion::Failed(package.name.clone()),
        BuildOutcome::Aborted {
            cause: AbortCause::Dependency { package },
        } => Completion::Failed(package.clone()),
        BuildOutcome::Aborted {
            cause: AbortCause::Cancelled,
        } => Completion::Cancelled,
    };
    NodeOutput {
        completion,
        outcome: Some(outcome),
    }
}

fn cancelled_output(scheduled: bool) -> NodeOutput {
    NodeOutput {
        completion: Completion::Cancelled,
        outcome: scheduled.then_some(BuildOutcome::Aborted {
            cause: AbortCause::Cancelled,
        }),
    }
}

/// Resolves once the flag flips to `true`; never resolves if the sender is gone.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
