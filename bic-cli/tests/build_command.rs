#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use filetime::{set_file_mtime, FileTime};
use predicates::str::contains;
use tempfile::TempDir;

/// `bic <args> --cwd <root>`; `--cwd` goes last so it binds to the subcommand.
fn bic_cmd(root: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bic"));
    cmd.args(args)
        .arg("--cwd")
        .arg(root)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("bic.yaml"), "runner: direct\n").expect("write config");
    dir
}

fn write_package(root: &Path, name: &str, deps: &[&str], script: &str) {
    let dir = root.join("packages").join(name);
    fs::create_dir_all(dir.join("src")).expect("mkdir");
    let deps = deps
        .iter()
        .map(|d| format!("\"{d}\": \"*\""))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        dir.join("package.json"),
        format!(
            r#"{{"name": "{name}", "dependencies": {{{deps}}}, "scripts": {{"build": "{script}"}}}}"#
        ),
    )
    .expect("write manifest");
    fs::write(dir.join("src/index.js"), format!("// {name}\n")).expect("write source");
}

#[test]
fn empty_root_reports_no_packages() {
    let root = workspace();
    bic_cmd(root.path(), &[])
        .assert()
        .success()
        .stdout(contains("No packages were found."));
}

#[test]
fn broken_manifest_reports_no_changes() {
    let root = workspace();
    fs::create_dir_all(root.path().join("packages/broken")).expect("mkdir");
    fs::write(root.path().join("packages/broken/package.json"), "{ nope").expect("write");

    bic_cmd(root.path(), &[])
        .assert()
        .success()
        .stdout(contains("No changes were found."));
}

#[test]
fn builds_once_then_reports_no_changes() {
    let root = workspace();
    write_package(root.path(), "core", &[], "echo compiled core");

    bic_cmd(root.path(), &[])
        .assert()
        .success()
        .stdout(contains("Building 1 package(s)..."))
        .stdout(contains("[core] compiled core"))
        .stdout(contains("Finished without errors."));

    bic_cmd(root.path(), &[])
        .assert()
        .success()
        .stdout(contains("No changes were found."));
}

#[test]
fn force_rebuilds_unchanged_packages() {
    let root = workspace();
    write_package(root.path(), "core", &[], "true");
    bic_cmd(root.path(), &[]).assert().success();

    bic_cmd(root.path(), &["--force"])
        .assert()
        .success()
        .stdout(contains("Building 1 package(s)..."));
}

#[test]
fn silent_hides_build_stdout() {
    let root = workspace();
    write_package(root.path(), "core", &[], "echo compiled core");

    let assert = bic_cmd(root.path(), &["build", "-s"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.is_empty(), "unexpected output: {stdout}");
}

#[test]
fn failure_exits_nonzero_and_names_the_root_cause() {
    let root = workspace();
    write_package(root.path(), "core", &[], "exit 4");
    write_package(root.path(), "app", &["core"], "true");

    bic_cmd(root.path(), &[])
        .assert()
        .failure()
        .stderr(contains("Build failed. Check the logs above."))
        .stderr(contains("core failed (exited with code 4)"))
        .stderr(contains("app aborted (dependency 'core' failed)"));
}

#[test]
fn cycle_is_a_fatal_error() {
    let root = workspace();
    write_package(root.path(), "a", &["b"], "true");
    write_package(root.path(), "b", &["a"], "true");

    bic_cmd(root.path(), &[])
        .assert()
        .failure()
        .stderr(contains("dependency cycle detected"));
}

#[test]
fn skip_flag_hides_packages_from_discovery() {
    let root = workspace();
    write_package(root.path(), "core", &[], "true");

    bic_cmd(root.path(), &["--skip", "packages/core"])
        .assert()
        .success()
        .stdout(contains("No packages were found."));
}

#[test]
fn status_json_reports_signals_without_building() {
    let root = workspace();
    write_package(root.path(), "core", &[], "touch built");
    write_package(root.path(), "docs", &[], "");

    let assert = bic_cmd(root.path(), &["status", "--json"])
        .assert()
        .success();
    let payload: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("status JSON");

    assert_eq!(payload["summary"]["packages"], 2);
    assert_eq!(payload["summary"]["changed"], 1);
    let packages = payload["packages"].as_array().expect("packages array");
    let core = packages
        .iter()
        .find(|p| p["name"] == "core")
        .expect("core row");
    assert_eq!(core["status"], "never_built");
    assert_eq!(core["path"], "packages/core");
    let docs = packages
        .iter()
        .find(|p| p["name"] == "docs")
        .expect("docs row");
    assert_eq!(docs["status"], "bypassed");
    assert!(!root.path().join("packages/core/built").exists());
}

#[test]
fn status_after_edit_reports_modified() {
    let root = workspace();
    write_package(root.path(), "core", &[], "true");
    bic_cmd(root.path(), &[]).assert().success();

    let source = root.path().join("packages/core/src/index.js");
    fs::write(&source, "// edited\n").expect("edit");
    set_file_mtime(&source, FileTime::from_unix_time(2_000_000_000, 0)).expect("set mtime");

    bic_cmd(root.path(), &["status"])
        .assert()
        .success()
        .stdout(contains("MODIFIED"))
        .stdout(contains("src/index.js changed"));
}
