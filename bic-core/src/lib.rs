//! bic core library: package model, manifest loading, discovery, config.
//!
//! - [`types`]: newtypes and domain structs
//! - [`manifest`]: `package.json` → [`Package`]
//! - [`discovery`]: glob/`.gitignore`-aware crawling
//! - [`config`]: `bic.yaml` and [`RunOptions`]
//! - [`error`]: [`CoreError`], [`ConfigError`]

pub mod config;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod types;

pub use config::{RunConfig, RunOptions};
pub use discovery::{find_packages, Crawl, PathFilter};
pub use error::{ConfigError, CoreError};
pub use manifest::{load_package, load_packages};
pub use types::{
    BuildCommand, BypassReason, CacheConfig, DependencyRef, DependencySpec, Package, PackageName,
    Runner,
};
