#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bic_cache::CACHE_FILE_NAME;
use bic_core::{RunOptions, Runner};
use bic_runner::{
    AbortCause, BuildOutcome, MemorySink, Orchestrator, Palette, RunSummary, Stream,
};
use filetime::{set_file_mtime, FileTime};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;

fn write_package(root: &Path, dir: &str, name: &str, deps: &[&str], script: &str) {
    let pkg = root.join(dir);
    fs::create_dir_all(pkg.join("src")).expect("mkdir");
    let deps: serde_json::Map<_, _> = deps.iter().map(|d| (d.to_string(), json!("*"))).collect();
    let manifest = json!({
        "name": name,
        "dependencies": deps,
        "scripts": { "build": script },
    });
    fs::write(pkg.join("package.json"), manifest.to_string()).expect("write manifest");
    fs::write(pkg.join("src/index.js"), format!("// {name}\n")).expect("write source");
}

fn orchestrator(root: &Path) -> (Orchestrator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let opts = RunOptions::new(root).with_runner(Runner::Direct);
    let orchestrator = Orchestrator::new(opts)
        .with_sink(sink.clone())
        .with_palette(Palette::plain());
    (orchestrator, sink)
}

async fn run(root: &Path) -> RunSummary {
    let (_tx, rx) = watch::channel(false);
    let (orchestrator, _) = orchestrator(root);
    orchestrator.run(rx).await.expect("run")
}

fn built(summary: RunSummary) -> bic_runner::BuildReport {
    match summary {
        RunSummary::Built(report) => report,
        other => panic!("expected a build, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_root_reports_no_packages() {
    let dir = TempDir::new().expect("tempdir");
    assert!(matches!(run(dir.path()).await, RunSummary::NoPackages));
}

#[tokio::test]
async fn unloadable_manifests_still_count_as_packages() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("broken")).expect("mkdir");
    fs::write(dir.path().join("broken/package.json"), "{ nope").expect("write manifest");

    let (orchestrator, _) = orchestrator(dir.path());
    let plan = orchestrator.plan().await.expect("plan");
    assert_eq!(plan.discovered, 1);
    assert!(plan.packages.is_empty());
    assert!(matches!(run(dir.path()).await, RunSummary::NoChanges));
}

#[tokio::test]
async fn run_with_reports_the_plan_only_when_building() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "packages/core", "core", &[], "true");
    let (orchestrator, _) = orchestrator(dir.path());

    let (_tx, rx) = watch::channel(false);
    let mut announced = None;
    let summary = orchestrator
        .run_with(rx, |plan| announced = Some(plan.changed().count()))
        .await
        .expect("run");
    assert!(summary.is_success());
    assert_eq!(announced, Some(1));

    let (_tx, rx) = watch::channel(false);
    let mut announced = None;
    let summary = orchestrator
        .run_with(rx, |plan| announced = Some(plan.changed().count()))
        .await
        .expect("run");
    assert!(matches!(summary, RunSummary::NoChanges));
    assert_eq!(announced, None);
}

#[tokio::test]
async fn second_run_without_changes_has_nothing_to_do() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "packages/core", "core", &[], "echo built core");

    let (_tx, rx) = watch::channel(false);
    let (orchestrator, sink) = orchestrator(dir.path());
    let report = built(orchestrator.run(rx).await.expect("run"));
    assert!(report.is_success());
    assert!(sink
        .lines()
        .contains(&(Stream::Stdout, "[core] built core".to_string())));
    assert!(dir.path().join("packages/core").join(CACHE_FILE_NAME).is_file());

    assert!(matches!(run(dir.path()).await, RunSummary::NoChanges));
}

#[tokio::test]
async fn failed_build_leaves_cache_byte_identical() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "core", "core", &[], "test ! -f broken");
    let cache = dir.path().join("core").join(CACHE_FILE_NAME);

    assert!(built(run(dir.path()).await).is_success());
    let before = fs::read(&cache).expect("read cache");

    fs::write(dir.path().join("core/broken"), "1").expect("write flag");
    let report = built(run(dir.path()).await);
    assert_eq!(
        report.outcome_of("core"),
        Some(&BuildOutcome::Failed {
            reason: "exited with code 1".into()
        })
    );
    assert_eq!(fs::read(&cache).expect("read cache"), before);

    // Still changed on the next run, since nothing was persisted.
    assert!(matches!(run(dir.path()).await, RunSummary::Built(_)));
}

#[tokio::test]
async fn dependency_change_does_not_rebuild_dependents() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "core", "core", &[], "true");
    write_package(dir.path(), "app", "app", &["core"], "true");
    assert!(built(run(dir.path()).await).is_success());

    let source = dir.path().join("core/src/index.js");
    fs::write(&source, "// core v2\n").expect("edit");
    set_file_mtime(&source, FileTime::from_unix_time(2_000_000_000, 0)).expect("set mtime");
    let report = built(run(dir.path()).await);

    assert_eq!(report.outcome_of("core"), Some(&BuildOutcome::Succeeded));
    assert_eq!(report.outcome_of("app"), Some(&BuildOutcome::Skipped));
    let names: Vec<_> = report.scheduled().map(|p| p.name.0.as_str()).collect();
    assert_eq!(names, vec!["core"]);
}

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
    let dir = TempDir::new().expect("tempdir");
    let step = |name: &str| {
        format!("echo start-{name} >> ../order.log; sleep 0.2; echo end-{name} >> ../order.log")
    };
    write_package(dir.path(), "a", "a", &[], &step("a"));
    write_package(dir.path(), "b", "b", &["a"], &step("b"));
    write_package(dir.path(), "c", "c", &["b"], &step("c"));

    assert!(built(run(dir.path()).await).is_success());

    let log = fs::read_to_string(dir.path().join("order.log")).expect("read log");
    let events: Vec<_> = log.lines().collect();
    assert_eq!(
        events,
        vec!["start-a", "end-a", "start-b", "end-b", "start-c", "end-c"]
    );
}

#[tokio::test]
async fn failure_is_attributed_to_root_cause() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "core", "core", &[], "echo broken >&2; exit 2");
    write_package(dir.path(), "app", "app", &["core"], "touch ran");

    let (_tx, rx) = watch::channel(false);
    let (orchestrator, sink) = orchestrator(dir.path());
    let report = built(orchestrator.run(rx).await.expect("run"));

    assert!(!report.is_success());
    assert_eq!(
        report.outcome_of("app"),
        Some(&BuildOutcome::Aborted {
            cause: AbortCause::Dependency {
                package: "core".into()
            }
        })
    );
    assert!(!dir.path().join("app/ran").exists());
    assert!(!dir.path().join("app").join(CACHE_FILE_NAME).exists());
    assert!(sink
        .lines()
        .contains(&(Stream::Stderr, "[core] broken".to_string())));
}

#[tokio::test]
async fn plan_classifies_without_building() {
    let dir = TempDir::new().expect("tempdir");
    write_package(dir.path(), "core", "core", &[], "touch ran");
    let (orchestrator, _) = orchestrator(dir.path());

    let plan = orchestrator.plan().await.expect("plan");
    assert_eq!(plan.packages.len(), 1);
    assert_eq!(plan.changed().count(), 1);
    assert!(!dir.path().join("core/ran").exists());
}
