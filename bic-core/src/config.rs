//! Run configuration: the optional root `bic.yaml` plus per-invocation options.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::PathFilter;
use crate::error::ConfigError;
use crate::types::Runner;

/// Config file looked up in the run root.
pub const CONFIG_FILE_NAME: &str = "bic.yaml";

/// Files digested at once within one package.
pub const DEFAULT_HASH_CONCURRENCY: usize = 16;

/// Contents of `bic.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Extra globs skipped during discovery.
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<Runner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_concurrency: Option<usize>,
}

impl RunConfig {
    /// Load `<root>/bic.yaml`, or defaults when it does not exist.
    pub fn load_at(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
    }
}

/// Options shared by discovery, change detection, and the build run.
#[derive(Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    /// Treat every participating package as changed.
    pub force: bool,
    /// Suppress status messages and forwarded stdout.
    pub silent: bool,
    pub skip: Vec<String>,
    pub filter: Option<PathFilter>,
    pub runner: Runner,
    pub hash_concurrency: usize,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("root", &self.root)
            .field("force", &self.force)
            .field("silent", &self.silent)
            .field("skip", &self.skip)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("runner", &self.runner)
            .field("hash_concurrency", &self.hash_concurrency)
            .finish()
    }
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force: false,
            silent: false,
            skip: Vec::new(),
            filter: None,
            runner: Runner::Auto,
            hash_concurrency: DEFAULT_HASH_CONCURRENCY,
        }
    }

    /// Options seeded from a loaded `bic.yaml`.
    pub fn from_config(root: impl Into<PathBuf>, config: RunConfig) -> Self {
        let mut opts = Self::new(root);
        opts.skip = config.skip;
        if let Some(runner) = config.runner {
            opts.runner = runner;
        }
        if let Some(n) = config.hash_concurrency {
            opts.hash_concurrency = n.max(1);
        }
        opts
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Append skip globs to the ones already configured.
    pub fn with_skip<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_hash_concurrency(mut self, n: usize) -> Self {
        self.hash_concurrency = n.max(1);
        self
    }
}
