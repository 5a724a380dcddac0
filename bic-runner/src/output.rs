//! Labeled build output: color palette, sinks, and blank-line trimming.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use colored::Colorize;

use bic_core::PackageName;

/// Prefix colors, handed out in order and wrapping after the last one.
const PALETTE: [(u8, u8, u8); 12] = [
    (255, 51, 204),
    (51, 204, 255),
    (255, 255, 102),
    (0, 255, 153),
    (153, 153, 255),
    (255, 0, 51),
    (255, 0, 204),
    (0, 153, 204),
    (255, 255, 0),
    (0, 255, 51),
    (0, 51, 255),
    (255, 0, 0),
];

/// Rotating prefix assignment for one run.
#[derive(Debug)]
pub struct Palette {
    next: AtomicUsize,
    colored: bool,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

impl Palette {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
            colored: true,
        }
    }

    /// A palette that emits bare `[name]` labels.
    pub fn plain() -> Self {
        Self {
            next: AtomicUsize::new(0),
            colored: false,
        }
    }

    /// Label for the next package to start.
    pub fn next_prefix(&self, name: &PackageName) -> String {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % PALETTE.len();
        let label = format!("[{name}]");
        if !self.colored {
            return label;
        }
        let (r, g, b) = PALETTE[slot];
        label.truecolor(r, g, b).to_string()
    }
}

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination for prefixed build output lines.
pub trait OutputSink: Send + Sync {
    fn line(&self, stream: Stream, prefix: &str, line: &str);
}

/// Writes stdout lines to stdout (unless silent) and stderr lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    pub silent: bool,
}

impl OutputSink for ConsoleSink {
    fn line(&self, stream: Stream, prefix: &str, line: &str) {
        match stream {
            Stream::Stdout if self.silent => {}
            Stream::Stdout => println!("{prefix} {line}"),
            Stream::Stderr => eprintln!("{prefix} {line}"),
        }
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemorySink {
    /// Every line seen so far as `"<prefix> <line>"`.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, stream: Stream, prefix: &str, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, format!("{prefix} {line}")));
        }
    }
}

/// Drops blank lines at the start of a stream and holds back blank lines
/// until a non-blank line follows, so trailing blanks never reach the sink.
#[derive(Debug, Default)]
pub struct LineTrimmer {
    started: bool,
    pending_blank: usize,
}

impl LineTrimmer {
    /// Feed one line; returns the lines ready to emit.
    pub fn push(&mut self, line: String) -> Vec<String> {
        if line.trim().is_empty() {
            if self.started {
                self.pending_blank += 1;
            }
            return Vec::new();
        }
        self.started = true;
        let mut ready = vec![String::new(); self.pending_blank];
        self.pending_blank = 0;
        ready.push(line);
        ready
    }
}
