//! `package.json` loading into [`Package`] values.
//!
//! Only the fields the build run needs are read; everything else in the
//! manifest is ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::discovery::MANIFEST_NAME;
use crate::error::{io_err, CoreError};
use crate::types::{
    normalize_path, BuildCommand, CacheConfig, DependencyRef, DependencySpec, Package,
    PackageName, Runner,
};

/// Version prefixes that point at a local directory instead of a registry.
const PATH_PREFIXES: &[&str] = &["file:", "link:", "portal:"];

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    scripts: BTreeMap<String, Value>,
    #[serde(default)]
    bic: Option<Value>,
}

/// Load the package rooted at `dir` (or whose manifest is `dir`).
pub fn load_package(dir: &Path, runner: Runner) -> Result<Package, CoreError> {
    let root = package_root(dir);
    let manifest_path = root.join(MANIFEST_NAME);
    if !manifest_path.is_file() {
        return Err(CoreError::ManifestNotFound { path: root });
    }
    let contents =
        std::fs::read_to_string(&manifest_path).map_err(|e| io_err(&manifest_path, e))?;
    let raw: RawManifest =
        serde_json::from_str(&contents).map_err(|e| CoreError::ManifestParse {
            path: manifest_path.clone(),
            source: e,
        })?;

    let cache_config = match &raw.bic {
        None => CacheConfig::Default,
        Some(value) => parse_cache_config(value).map_err(|message| CoreError::InvalidManifest {
            path: manifest_path.clone(),
            message,
        })?,
    };

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| root.display().to_string());

    let mut dependencies = Vec::new();
    for (dep, version) in raw.dependencies.iter().chain(raw.dev_dependencies.iter()) {
        if dependencies.iter().any(|d: &DependencySpec| d.name.0 == *dep) {
            continue;
        }
        dependencies.push(DependencySpec {
            name: PackageName::from(dep.as_str()),
            reference: dependency_ref(&root, version),
        });
    }

    let build = raw
        .scripts
        .get("build")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(|script| BuildCommand {
            script: script.to_string(),
            runner: runner.resolve(&root),
        });

    Ok(Package {
        name: PackageName::from(name),
        root,
        manifest_path,
        dependencies,
        build,
        cache_config,
    })
}

/// Load every package in `paths` (relative to `base`). Packages whose
/// manifest is missing or malformed are logged and left out.
pub fn load_packages<P: AsRef<Path>>(base: &Path, paths: &[P], runner: Runner) -> Vec<Package> {
    paths
        .iter()
        .filter_map(|p| {
            let dir = base.join(p.as_ref());
            match load_package(&dir, runner) {
                Ok(pkg) => Some(pkg),
                Err(err) => {
                    tracing::warn!(path = %dir.display(), error = %err, "skipping package");
                    None
                }
            }
        })
        .collect()
}

/// Resolve the manifest `bic` field into a [`CacheConfig`].
pub fn parse_cache_config(value: &Value) -> Result<CacheConfig, String> {
    match value {
        Value::Null => Ok(CacheConfig::Default),
        Value::Bool(false) => Ok(CacheConfig::Disabled),
        Value::Bool(true) => Ok(CacheConfig::Always),
        Value::Array(_) => Ok(CacheConfig::Explicit {
            only: string_list(value, "bic")?,
            skip: Vec::new(),
        }),
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|k| *k != "only" && *k != "skip") {
                return Err(format!("unknown key 'bic.{key}'"));
            }
            let only = match map.get("only") {
                Some(v) => string_list(v, "bic.only")?,
                None => Vec::new(),
            };
            let skip = match map.get("skip") {
                Some(v) => string_list(v, "bic.skip")?,
                None => Vec::new(),
            };
            Ok(CacheConfig::Explicit { only, skip })
        }
        other => Err(format!(
            "'bic' must be false, true, a glob list, or {{only, skip}}; got {other}"
        )),
    }
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, String> {
    let Some(items) = value.as_array() else {
        return Err(format!("'{field}' must be a list of globs"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("'{field}' entries must be strings; got {item}"))
        })
        .collect()
}

fn dependency_ref(root: &Path, version: &Value) -> DependencyRef {
    let text = version.as_str().unwrap_or_default();
    for prefix in PATH_PREFIXES {
        if let Some(rel) = text.strip_prefix(prefix) {
            return DependencyRef::Path(normalize_path(&root.join(rel)));
        }
    }
    DependencyRef::Registry(text.to_string())
}

fn package_root(dir: &Path) -> PathBuf {
    let dir = if dir.file_name().is_some_and(|n| n == MANIFEST_NAME) {
        dir.parent().unwrap_or(dir)
    } else {
        dir
    };
    normalize_path(dir)
}
