//! Fingerprint store: per-package record of tracked file states.
//!
//! Persists a [`FingerprintStore`] JSON document at `<package root>/.bic_cache`.
//! Writes go to `.bic_cache.tmp` first and are renamed into place, so a reader
//! never observes a half-written file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CacheError};

/// Cache file name inside every package root.
pub const CACHE_FILE_NAME: &str = ".bic_cache";

/// Temporary sibling used for the atomic write.
pub const CACHE_TMP_NAME: &str = ".bic_cache.tmp";

/// Observed state of one file: modification time (Unix millis) and SHA-256
/// hex digest. Serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, String)", into = "(u64, String)")]
pub struct Fingerprint {
    pub mtime_ms: u64,
    pub digest: String,
}

impl From<(u64, String)> for Fingerprint {
    fn from((mtime_ms, digest): (u64, String)) -> Self {
        Self { mtime_ms, digest }
    }
}

impl From<Fingerprint> for (u64, String) {
    fn from(fp: Fingerprint) -> Self {
        (fp.mtime_ms, fp.digest)
    }
}

/// Maps package-relative, `/`-separated paths to their fingerprint.
pub type Fingerprints = BTreeMap<String, Fingerprint>;

/// On-disk payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintStore {
    pub built_at: DateTime<Utc>,
    pub files: Fingerprints,
}

impl FingerprintStore {
    pub fn empty() -> Self {
        Self {
            built_at: Utc::now(),
            files: Fingerprints::new(),
        }
    }

    /// Stamp the store as built now. Call right before saving it after a
    /// successful build.
    pub fn mark_built(&mut self) {
        self.built_at = Utc::now();
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoreCompat {
    Structured(StructuredCompat),
    Legacy(Fingerprints),
}

#[derive(Debug, Deserialize)]
struct StructuredCompat {
    built_at: Option<DateTime<Utc>>,
    files: Fingerprints,
}

/// `<root>/.bic_cache`
pub fn store_path(root: &Path) -> PathBuf {
    root.join(CACHE_FILE_NAME)
}

/// Read the store strictly.
///
/// Returns `Ok(None)` when the file does not exist. Unknown fields are
/// ignored; the flat `{path: [mtime, digest]}` shape is accepted too.
pub fn try_load_at(root: &Path) -> Result<Option<FingerprintStore>, CacheError> {
    let path = store_path(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    let store = match serde_json::from_str::<StoreCompat>(&contents)? {
        StoreCompat::Structured(store) => FingerprintStore {
            built_at: store.built_at.unwrap_or_else(Utc::now),
            files: store.files,
        },
        StoreCompat::Legacy(files) => FingerprintStore {
            built_at: Utc::now(),
            files,
        },
    };
    Ok(Some(store))
}

/// Read the store, treating an unreadable or corrupt file as absent.
pub fn load_at(root: &Path) -> Option<FingerprintStore> {
    match try_load_at(root) {
        Ok(store) => store,
        Err(err) => {
            tracing::debug!(root = %root.display(), error = %err, "ignoring unreadable cache");
            None
        }
    }
}

/// Save the store for the package at `root` atomically.
pub fn save_at(root: &Path, store: &FingerprintStore) -> Result<(), CacheError> {
    let path = store_path(root);
    let tmp = root.join(CACHE_TMP_NAME);
    let json = serde_json::to_string_pretty(store)?;
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
