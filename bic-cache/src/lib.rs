//! # bic-cache
//!
//! Per-package fingerprint persistence and change detection.
//!
//! Call [`detect`] to decide whether one package must rebuild, or
//! [`detect_all`] to classify a whole package set concurrently. Persist the
//! returned store with [`fingerprint::save_at`] only after a successful build.

pub mod detect;
pub mod error;
pub mod fingerprint;

pub use detect::{detect, detect_all, ChangeSignal, Detection};
pub use error::CacheError;
pub use fingerprint::{Fingerprint, FingerprintStore, CACHE_FILE_NAME};
