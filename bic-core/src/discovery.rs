//! File crawling with include/exclude globs and `.gitignore` rules.
//!
//! Built on the `ignore` crate's walker so ignored directories are pruned on
//! entry rather than filtered after the fact. Hidden entries (`.*`) and
//! `node_modules` are always skipped. Include globs narrow what the walker
//! yields and never bring back a hidden or gitignored file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;

use crate::config::RunOptions;
use crate::error::{io_err, CoreError};

/// The manifest file that marks a package root.
pub const MANIFEST_NAME: &str = "package.json";

/// Globs skipped in every crawl, whatever the include globs say.
pub const ALWAYS_SKIP: &[&str] = &[".*", "node_modules"];

/// Caller-supplied predicate over absolute paths. Returning `false` excludes
/// the entry; for directories the whole subtree is skipped.
pub type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// A single crawl of one directory tree.
#[derive(Clone)]
pub struct Crawl {
    root: PathBuf,
    only: Vec<String>,
    skip: Vec<String>,
    filter: Option<PathFilter>,
}

impl Crawl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            only: Vec::new(),
            skip: Vec::new(),
            filter: None,
        }
    }

    /// Whitelist globs. When non-empty, only matching files are returned.
    pub fn only<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(globs.into_iter().map(Into::into));
        self
    }

    /// Exclusion globs, applied to files and directories.
    pub fn skip<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: Option<PathFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Walk the tree and return root-relative, `/`-separated file paths,
    /// sorted. Unreadable entries are logged and skipped.
    pub fn run(&self) -> Result<Vec<String>, CoreError> {
        let meta = std::fs::metadata(&self.root).map_err(|e| io_err(&self.root, e))?;
        if !meta.is_dir() {
            return Err(io_err(
                &self.root,
                std::io::Error::other("crawl root is not a directory"),
            ));
        }

        // The walker only ever sees exclusions, so hidden and `.gitignore`
        // rules still apply to files an `only` glob would match.
        let mut skips = OverrideBuilder::new(&self.root);
        for glob in self.skip.iter().map(String::as_str).chain(ALWAYS_SKIP.iter().copied()) {
            add_glob(&mut skips, &format!("!{glob}"))?;
        }
        let skips = skips.build().map_err(|e| CoreError::Pattern {
            pattern: self.skip.join(", "),
            source: e,
        })?;
        let only = self.only_matcher()?;

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .require_git(false)
            .overrides(skips);
        if let Some(filter) = self.filter.clone() {
            builder.filter_entry(move |entry| filter(entry.path()));
        }

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(root = %self.root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Some(only) = &only {
                if !only.matched(entry.path(), false).is_whitelist() {
                    continue;
                }
            }
            if let Some(rel) = relative_key(&self.root, entry.path()) {
                files.push(rel);
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Matcher for the `only` globs, `None` when every file qualifies.
    fn only_matcher(&self) -> Result<Option<Override>, CoreError> {
        if self.only.is_empty() {
            return Ok(None);
        }
        let mut builder = OverrideBuilder::new(&self.root);
        for glob in &self.only {
            add_glob(&mut builder, glob)?;
        }
        let only = builder.build().map_err(|e| CoreError::Pattern {
            pattern: self.only.join(", "),
            source: e,
        })?;
        Ok(Some(only))
    }
}

/// Find every `package.json` under the run root, honoring the run's skip
/// list and filter.
pub fn find_packages(opts: &RunOptions) -> Result<Vec<String>, CoreError> {
    Crawl::new(&opts.root)
        .only([MANIFEST_NAME])
        .skip(opts.skip.iter().cloned())
        .filter(opts.filter.clone())
        .run()
}

fn add_glob(builder: &mut OverrideBuilder, glob: &str) -> Result<(), CoreError> {
    builder.add(glob).map(|_| ()).map_err(|e| CoreError::Pattern {
        pattern: glob.to_string(),
        source: e,
    })
}

/// `root`-relative path joined with `/` regardless of platform.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, rel).expect("write");
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        for rel in [
            "package.json",
            "src/index.js",
            "src/util/math.js",
            "README.md",
            ".env",
            ".git/HEAD",
            "node_modules/left-pad/index.js",
            "dist/bundle.js",
        ] {
            touch(dir.path(), rel);
        }
        dir
    }

    #[test]
    fn skips_hidden_and_node_modules() {
        let dir = tree();
        let files = Crawl::new(dir.path()).run().expect("crawl");
        assert_eq!(
            files,
            vec![
                "README.md",
                "dist/bundle.js",
                "package.json",
                "src/index.js",
                "src/util/math.js",
            ]
        );
    }

    #[test]
    fn only_and_skip_globs() {
        let dir = tree();
        let files = Crawl::new(dir.path())
            .only(["*.js"])
            .skip(["dist"])
            .run()
            .expect("crawl");
        assert_eq!(files, vec!["src/index.js", "src/util/math.js"]);
    }

    #[test]
    fn gitignore_is_honored_without_git_repo() {
        let dir = tree();
        fs::write(dir.path().join(".gitignore"), "dist/\n*.md\n").expect("write");
        let files = Crawl::new(dir.path()).run().expect("crawl");
        assert_eq!(
            files,
            vec!["package.json", "src/index.js", "src/util/math.js"]
        );
    }

    #[test]
    fn filter_prunes_directories() {
        let dir = tree();
        let filter: PathFilter = Arc::new(|path: &Path| !path.ends_with("util"));
        let files = Crawl::new(dir.path())
            .filter(Some(filter))
            .run()
            .expect("crawl");
        assert!(files.contains(&"src/index.js".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("src/util")));
    }

    #[test]
    fn find_packages_returns_manifests_only() {
        let dir = tree();
        touch(dir.path(), "packages/core/package.json");
        touch(dir.path(), "packages/core/index.js");
        let opts = RunOptions::new(dir.path());
        let found = find_packages(&opts).expect("find");
        assert_eq!(found, vec!["package.json", "packages/core/package.json"]);
    }

    #[test]
    fn only_globs_never_reach_hidden_or_gitignored_files() {
        let dir = TempDir::new().expect("tempdir");
        for rel in ["src/index.js", "src/.cache/blob", "src/generated/out.js", "src/.env"] {
            touch(dir.path(), rel);
        }
        fs::write(dir.path().join(".gitignore"), "src/generated/\n").expect("write");

        let files = Crawl::new(dir.path()).only(["src/**"]).run().expect("crawl");
        assert_eq!(files, vec!["src/index.js"]);
    }

    #[test]
    fn find_packages_skips_gitignored_manifests() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "packages/a/package.json");
        touch(dir.path(), "fixtures/b/package.json");
        touch(dir.path(), ".templates/c/package.json");
        fs::write(dir.path().join(".gitignore"), "fixtures/**/package.json\n").expect("write");

        let found = find_packages(&RunOptions::new(dir.path())).expect("find");
        assert_eq!(found, vec!["packages/a/package.json"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = Crawl::new(dir.path().join("nope")).run().unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
