//! Per-package build outcomes and the aggregate report of a run.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use bic_core::PackageName;

/// Why a package never started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortCause {
    /// A (transitive) dependency failed; `package` is the one whose own
    /// build command failed.
    Dependency { package: PackageName },
    /// The run was cancelled before or while this package built.
    Cancelled,
}

/// Terminal state of one package in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// No relevant change; the build command was not run.
    Skipped,
    Succeeded,
    /// The package's own build command failed or could not be spawned.
    Failed { reason: String },
    Aborted { cause: AbortCause },
}

impl BuildOutcome {
    /// Whether dependents may proceed.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, BuildOutcome::Skipped | BuildOutcome::Succeeded)
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Skipped => write!(f, "skipped"),
            BuildOutcome::Succeeded => write!(f, "succeeded"),
            BuildOutcome::Failed { reason } => write!(f, "failed ({reason})"),
            BuildOutcome::Aborted {
                cause: AbortCause::Dependency { package },
            } => write!(f, "aborted (dependency '{package}' failed)"),
            BuildOutcome::Aborted {
                cause: AbortCause::Cancelled,
            } => write!(f, "aborted (cancelled)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOutcome {
    pub name: PackageName,
    pub root: PathBuf,
    /// Whether the package was in the changed set this run.
    pub scheduled: bool,
    pub outcome: BuildOutcome,
}

/// Outcomes of every package known to a run, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub packages: Vec<PackageOutcome>,
}

impl BuildReport {
    /// True when every scheduled package succeeded.
    pub fn is_success(&self) -> bool {
        self.packages.iter().all(|p| p.outcome.is_satisfied())
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages.iter().filter(|p| p.scheduled)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages
            .iter()
            .filter(|p| matches!(p.outcome, BuildOutcome::Failed { .. }))
    }

    pub fn aborted(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages
            .iter()
            .filter(|p| matches!(p.outcome, BuildOutcome::Aborted { .. }))
    }

    pub fn outcome_of(&self, name: &str) -> Option<&BuildOutcome> {
        self.packages
            .iter()
            .find(|p| p.name.0 == name)
            .map(|p| &p.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, outcome: BuildOutcome) -> PackageOutcome {
        PackageOutcome {
            name: PackageName::from(name),
            root: PathBuf::from(format!("/repo/{name}")),
            scheduled: outcome != BuildOutcome::Skipped,
            outcome,
        }
    }

    #[test]
    fn success_requires_every_package_satisfied() {
        let mut report = BuildReport {
            packages: vec![
                entry("a", BuildOutcome::Succeeded),
                entry("b", BuildOutcome::Skipped),
            ],
        };
        assert!(report.is_success());

        report.packages.push(entry(
            "c",
            BuildOutcome::Failed {
                reason: "exited with code 2".into(),
            },
        ));
        report.packages.push(entry(
            "d",
            BuildOutcome::Aborted {
                cause: AbortCause::Dependency {
                    package: PackageName::from("c"),
                },
            },
        ));
        assert!(!report.is_success());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.aborted().count(), 1);
        assert_eq!(report.scheduled().count(), 3);
    }

    #[test]
    fn outcome_display_names_root_cause() {
        let outcome = BuildOutcome::Aborted {
            cause: AbortCause::Dependency {
                package: PackageName::from("core"),
            },
        };
        assert_eq!(outcome.to_string(), "aborted (dependency 'core' failed)");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(BuildOutcome::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
