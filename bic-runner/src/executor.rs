//! Runs one package's build command and forwards its output.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use bic_cache::{fingerprint, FingerprintStore};
use bic_core::{Package, Runner};

use crate::output::{LineTrimmer, OutputSink, Palette, Stream};
use crate::report::BuildOutcome;

/// Spawns build commands, labels their output, and persists the package's
/// fingerprint store after a successful exit.
#[derive(Clone)]
pub struct Executor {
    sink: Arc<dyn OutputSink>,
    palette: Arc<Palette>,
}

impl Executor {
    pub fn new(sink: Arc<dyn OutputSink>, palette: Arc<Palette>) -> Self {
        Self { sink, palette }
    }

    /// Build `pkg`. When the command exits 0 and `store` is given, the store
    /// is written to the package root; on any failure nothing is written.
    pub async fn build(&self, pkg: &Package, store: Option<FingerprintStore>) -> BuildOutcome {
        let Some(command) = &pkg.build else {
            return BuildOutcome::Failed {
                reason: "no build script".to_string(),
            };
        };

        let prefix = self.palette.next_prefix(&pkg.name);
        let line = command.shell_line();
        tracing::debug!(package = %pkg.name, command = %line, "starting build");

        let mut cmd = shell_command(&line);
        cmd.current_dir(&pkg.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if command.runner == Runner::Direct {
            if let Some(path) = path_with_local_bin(&pkg.root) {
                cmd.env("PATH", path);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(package = %pkg.name, error = %err, "failed to spawn build");
                return BuildOutcome::Failed {
                    reason: format!("failed to spawn: {err}"),
                };
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = self.sink.as_ref();
        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward(stdout, Stream::Stdout, &prefix, sink),
            forward(stderr, Stream::Stderr, &prefix, sink),
        );

        let status = match status {
            Ok(status) => status,
            Err(err) => {
                return BuildOutcome::Failed {
                    reason: format!("failed to wait for build: {err}"),
                }
            }
        };
        if !status.success() {
            let reason = exit_reason(status);
            tracing::debug!(package = %pkg.name, %reason, "build failed");
            return BuildOutcome::Failed { reason };
        }

        if let Some(mut store) = store {
            store.mark_built();
            let root = pkg.root.clone();
            let saved = tokio::task::spawn_blocking(move || fingerprint::save_at(&root, &store))
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| result.map_err(|e| e.to_string()));
            if let Err(err) = saved {
                tracing::warn!(package = %pkg.name, error = %err, "build succeeded but cache was not saved");
            }
        }
        BuildOutcome::Succeeded
    }
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let shell = std::env::var_os("COMSPEC").unwrap_or_else(|| OsString::from("cmd.exe"));
    let mut cmd = Command::new(shell);
    cmd.args(["/S", "/C", line]);
    cmd
}

/// `PATH` with `<root>/node_modules/.bin` in front.
fn path_with_local_bin(root: &Path) -> Option<OsString> {
    let bin = root.join("node_modules").join(".bin");
    let current = std::env::var_os("PATH").unwrap_or_default();
    let paths = std::iter::once(bin).chain(std::env::split_paths(&current));
    std::env::join_paths(paths).ok()
}

fn exit_reason(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}

async fn forward<R>(reader: Option<R>, stream: Stream, prefix: &str, sink: &dyn OutputSink)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else { return };
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut trimmer = LineTrimmer::default();
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let mut line = String::from_utf8_lossy(&bytes).into_owned();
                if line.ends_with('\r') {
                    line.pop();
                }
                for ready in trimmer.push(line) {
                    sink.line(stream, prefix, &ready);
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "stopped reading build output");
                break;
            }
        }
    }
}
