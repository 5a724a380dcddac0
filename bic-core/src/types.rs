//! Domain types for the package model.
//!
//! All path fields use `PathBuf`; package roots are absolute and lexically
//! normalized so they can be compared for path-reference resolution.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed package name, unique within one build run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName(pub String);

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a declared dependency points at its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    /// A registry version range (`^1.2.0`, `workspace:*`, ...). Resolved by name.
    Registry(String),
    /// A local `file:` / `link:` / `portal:` reference, already made absolute.
    Path(PathBuf),
}

/// Per-package change-detection override, resolved once from the manifest
/// `bic` field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheConfig {
    /// `"bic": false`: the package never participates in a run.
    Disabled,
    /// `"bic": true`: change detection is off, the package always builds.
    Always,
    /// No override; every non-ignored file is tracked.
    #[default]
    Default,
    /// Explicit include (`only`) and exclude (`skip`) globs.
    Explicit { only: Vec<String>, skip: Vec<String> },
}

impl CacheConfig {
    pub fn only(&self) -> &[String] {
        match self {
            CacheConfig::Explicit { only, .. } => only,
            _ => &[],
        }
    }

    pub fn skip(&self) -> &[String] {
        match self {
            CacheConfig::Explicit { skip, .. } => skip,
            _ => &[],
        }
    }
}

/// The tool that runs a package's `build` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// Pick from the lockfile present in the package root.
    #[default]
    Auto,
    Npm,
    Yarn,
    Pnpm,
    /// Run the script text itself through the platform shell.
    Direct,
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runner::Auto => write!(f, "auto"),
            Runner::Npm => write!(f, "npm"),
            Runner::Yarn => write!(f, "yarn"),
            Runner::Pnpm => write!(f, "pnpm"),
            Runner::Direct => write!(f, "direct"),
        }
    }
}

impl Runner {
    /// Resolve `Auto` against the lockfiles found in `root`.
    pub fn resolve(self, root: &Path) -> Runner {
        if self != Runner::Auto {
            return self;
        }
        if root.join("package-lock.json").is_file() {
            Runner::Npm
        } else if root.join("pnpm-lock.yaml").is_file() {
            Runner::Pnpm
        } else {
            Runner::Yarn
        }
    }
}

/// Why a package is left out of change detection entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// The manifest sets `"bic": false`.
    Disabled,
    /// There is no `build` script, or it is blank.
    NoBuildScript,
    /// The `build` script would re-invoke this tool.
    SelfTrigger,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BypassReason::Disabled => write!(f, "disabled in manifest"),
            BypassReason::NoBuildScript => write!(f, "no build script"),
            BypassReason::SelfTrigger => write!(f, "build script invokes bic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One declared dependency of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: PackageName,
    pub reference: DependencyRef,
}

/// The `build` script of a package and the runner that executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub script: String,
    /// Never `Runner::Auto`; resolved at load time.
    pub runner: Runner,
}

impl BuildCommand {
    /// The line handed to the platform shell.
    pub fn shell_line(&self) -> String {
        match self.runner {
            Runner::Direct => self.script.clone(),
            Runner::Npm => "npm run build".to_string(),
            Runner::Pnpm => "pnpm run build".to_string(),
            Runner::Yarn | Runner::Auto => "yarn run build".to_string(),
        }
    }

    /// True when the script would run this tool again (infinite recursion).
    pub fn is_self_trigger(&self) -> bool {
        contains_word(&self.script, "bic") || contains_word(&self.script, "build-if-changed")
    }
}

/// A buildable package discovered under the run root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: PackageName,
    /// Absolute, normalized package directory. Working directory of the build.
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub dependencies: Vec<DependencySpec>,
    /// `None` when the manifest has no non-blank `build` script.
    pub build: Option<BuildCommand>,
    pub cache_config: CacheConfig,
}

impl Package {
    /// Returns why this package can never be scheduled, if it can't.
    pub fn bypass_reason(&self) -> Option<BypassReason> {
        if self.cache_config == CacheConfig::Disabled {
            return Some(BypassReason::Disabled);
        }
        match &self.build {
            None => Some(BypassReason::NoBuildScript),
            Some(cmd) if cmd.is_self_trigger() => Some(BypassReason::SelfTrigger),
            Some(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lexically normalize `path`: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word search: `word` must not be glued to other word characters.
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
