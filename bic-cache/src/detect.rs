//! Change detection for a single package.
//!
//! Signal precedence:
//! 1. `Bypassed` (disabled, no build script, or self-triggering script)
//! 2. `NeverBuilt` (no readable cache file)
//! 3. `Modified` (tracked files added, edited, or deleted)
//! 4. `Forced` (`--force`, or `"bic": true` in the manifest)
//! 5. `Current`
//!
//! Files whose mtime matches the cache are never read. A file whose mtime
//! moved but whose digest did not gets its stored mtime refreshed without
//! counting as a change.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use sha2::{Digest, Sha256};

use bic_core::{BypassReason, CacheConfig, Crawl, Package, RunOptions};

use crate::error::{io_err, CacheError};
use crate::fingerprint::{self, Fingerprint, FingerprintStore, CACHE_FILE_NAME, CACHE_TMP_NAME};

/// Change classification for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    Bypassed { reason: BypassReason },
    NeverBuilt,
    Modified { files: Vec<String> },
    Forced,
    Current,
}

impl ChangeSignal {
    /// Whether the package's build must run.
    pub fn is_changed(&self) -> bool {
        matches!(
            self,
            ChangeSignal::NeverBuilt | ChangeSignal::Modified { .. } | ChangeSignal::Forced
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeSignal::Bypassed { .. } => "bypassed",
            ChangeSignal::NeverBuilt => "never built",
            ChangeSignal::Modified { .. } => "modified",
            ChangeSignal::Forced => "forced",
            ChangeSignal::Current => "current",
        }
    }
}

/// Outcome of change detection: the signal plus the fingerprint store to
/// persist if the package then builds successfully.
#[derive(Debug, Clone)]
pub struct Detection {
    pub signal: ChangeSignal,
    pub store: FingerprintStore,
}

enum Probe {
    Unchanged,
    Touched { name: String, mtime_ms: u64 },
    Changed { name: String, fingerprint: Fingerprint },
    Vanished { name: String },
}

/// Decide whether `pkg` needs to rebuild.
pub async fn detect(pkg: &Package, opts: &RunOptions) -> Result<Detection, CacheError> {
    if let Some(reason) = pkg.bypass_reason() {
        return Ok(Detection {
            signal: ChangeSignal::Bypassed { reason },
            store: FingerprintStore::empty(),
        });
    }

    let previous = fingerprint::load_at(&pkg.root);
    let never_built = previous.is_none();

    if pkg.cache_config == CacheConfig::Always {
        return Ok(Detection {
            signal: if never_built {
                ChangeSignal::NeverBuilt
            } else {
                ChangeSignal::Forced
            },
            store: previous.unwrap_or_else(FingerprintStore::empty),
        });
    }

    let files = tracked_files(pkg, opts).await?;
    let mut store = previous.unwrap_or_else(FingerprintStore::empty);
    let mut changed = BTreeSet::new();

    // Deleted files count as changes.
    let tracked: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let deleted: Vec<String> = store
        .files
        .keys()
        .filter(|name| !tracked.contains(name.as_str()))
        .cloned()
        .collect();
    for name in deleted {
        store.files.remove(&name);
        changed.insert(name);
    }

    let probes: Vec<Result<Probe, CacheError>> = stream::iter(files.iter().map(|name| {
        let path = pkg.root.join(name);
        let previous = store.files.get(name).cloned();
        probe(path, name.clone(), previous)
    }))
    .buffer_unordered(opts.hash_concurrency.max(1))
    .collect()
    .await;

    for probe in probes {
        match probe? {
            Probe::Unchanged => {}
            Probe::Touched { name, mtime_ms } => {
                if let Some(entry) = store.files.get_mut(&name) {
                    entry.mtime_ms = mtime_ms;
                }
            }
            Probe::Changed { name, fingerprint } => {
                store.files.insert(name.clone(), fingerprint);
                changed.insert(name);
            }
            Probe::Vanished { name } => {
                if store.files.remove(&name).is_some() {
                    changed.insert(name);
                }
            }
        }
    }

    let signal = if never_built {
        ChangeSignal::NeverBuilt
    } else if !changed.is_empty() {
        ChangeSignal::Modified {
            files: changed.into_iter().collect(),
        }
    } else if opts.force {
        ChangeSignal::Forced
    } else {
        ChangeSignal::Current
    };

    tracing::debug!(
        package = %pkg.name,
        signal = signal.label(),
        tracked = store.files.len(),
        "change detection finished"
    );
    Ok(Detection { signal, store })
}

/// Run [`detect`] for every package concurrently. Results keep input order.
pub async fn detect_all(
    packages: Vec<Package>,
    opts: &RunOptions,
) -> Vec<(Package, Result<Detection, CacheError>)> {
    join_all(packages.into_iter().map(|pkg| async move {
        let detection = detect(&pkg, opts).await;
        (pkg, detection)
    }))
    .await
}

async fn tracked_files(pkg: &Package, opts: &RunOptions) -> Result<Vec<String>, CacheError> {
    let crawl = Crawl::new(&pkg.root)
        .only(pkg.cache_config.only().iter().cloned())
        .skip(pkg.cache_config.skip().iter().cloned())
        .skip([CACHE_FILE_NAME, CACHE_TMP_NAME])
        .filter(opts.filter.clone());
    let mut files = tokio::task::spawn_blocking(move || crawl.run())
        .await
        .map_err(|e| CacheError::Task(e.to_string()))??;
    files.retain(|f| f != CACHE_FILE_NAME && f != CACHE_TMP_NAME);
    Ok(files)
}

async fn probe(
    path: PathBuf,
    name: String,
    previous: Option<Fingerprint>,
) -> Result<Probe, CacheError> {
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Probe::Vanished { name }),
        Err(err) => return Err(io_err(&path, err)),
    };
    let mtime_ms = meta
        .modified()
        .map(unix_millis)
        .map_err(|e| io_err(&path, e))?;

    if previous.as_ref().is_some_and(|fp| fp.mtime_ms == mtime_ms) {
        return Ok(Probe::Unchanged);
    }

    let hash_path = path.clone();
    let digest = match tokio::task::spawn_blocking(move || hash_file(&hash_path))
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    {
        Ok(digest) => digest,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Probe::Vanished { name }),
        Err(err) => return Err(io_err(&path, err)),
    };

    match previous {
        Some(fp) if fp.digest == digest => Ok(Probe::Touched { name, mtime_ms }),
        _ => Ok(Probe::Changed {
            name,
            fingerprint: Fingerprint { mtime_ms, digest },
        }),
    }
}

/// SHA-256 hex digest of the raw file bytes.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn unix_millis(timestamp: SystemTime) -> u64 {
    let since = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since.as_millis()).unwrap_or(u64::MAX)
}

/// Format age from a chrono timestamp (cache `built_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_duration(Duration::from_secs(age))
}

fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
