use super::RegressionCheck;
use crate::error::{RegtestError, Result};
use crate::sanity::{ExecutionRecord, FailureKind, Verdict};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use tracing::{info, warn};

/// Order checks so that every check comes after the checks it depends on.
///
/// Dependencies outside `checks` are ignored. A cycle is a configuration error.
pub fn dependency_order(checks: &[RegressionCheck]) -> Result<Vec<&RegressionCheck>> {
    let names: BTreeSet<&str> = checks.iter().map(|c| c.name()).collect();
    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(checks.len());

    while ordered.len() < checks.len() {
        let ready: Vec<&RegressionCheck> = checks
            .iter()
            .filter(|c| !placed.contains(c.name()))
            .filter(|c| {
                c.config
                    .depends_on
                    .iter()
                    .all(|dep| placed.contains(dep.as_str()) || !names.contains(dep.as_str()))
            })
            .collect();
        if ready.is_empty() {
            let stuck: Vec<&str> = checks
                .iter()
                .map(|c| c.name())
                .filter(|name| !placed.contains(name))
                .collect();
            return Err(RegtestError::Config(format!(
                "dependency cycle between {}",
                stuck.join(", ")
            )));
        }
        for check in ready {
            placed.insert(check.name());
            ordered.push(check);
        }
    }
    Ok(ordered)
}

/// Verdicts of one suite run; dependants of a failed check are not attempted
#[derive(Debug, Default, Serialize)]
pub struct Session {
    verdicts: Vec<Verdict>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// First dependency of `check` that did not pass in this session
    pub fn failed_dependency(&self, check: &RegressionCheck) -> Option<&str> {
        check.config.depends_on.iter().find_map(|dep| {
            self.verdicts
                .iter()
                .find(|v| &v.check == dep && !v.passed)
                .map(|v| v.check.as_str())
        })
    }

    /// Judge `check`, loading its record only when its dependencies passed.
    ///
    /// A record that cannot be loaded fails this check alone.
    pub fn run<F>(&mut self, check: &RegressionCheck, load: F) -> &Verdict
    where
        F: FnOnce() -> Result<ExecutionRecord>,
    {
        let verdict = match self.failed_dependency(check) {
            Some(dep) => {
                warn!("{}: not attempted, dependency {} failed", check.name(), dep);
                Verdict::skipped(check.name(), dep)
            }
            None => match load() {
                Ok(record) => check.evaluate(&record),
                Err(e) => {
                    warn!("{}: cannot load output: {}", check.name(), e);
                    Verdict::unreadable(check.name(), unreadable_reason(&e))
                }
            },
        };
        info!(
            "{}: {}",
            verdict.check,
            if verdict.passed { "passed" } else { "failed" }
        );
        self.verdicts.push(verdict);
        let index = self.verdicts.len() - 1;
        &self.verdicts[index]
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn summary(&self) -> Summary {
        self.verdicts.iter().fold(Summary::default(), |mut s, v| {
            match v.failure_kind() {
                None => s.passed += 1,
                Some(FailureKind::Skipped) => s.skipped += 1,
                Some(_) => s.failed += 1,
            }
            s
        })
    }

    pub fn all_passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }
}

fn unreadable_reason(error: &RegtestError) -> String {
    match error {
        RegtestError::Io { path, source } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            if source.kind() == ErrorKind::NotFound {
                format!("`{}` was not produced by the run", name)
            } else {
                format!("cannot read `{}`: {}", name, source)
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::checks::{checks_in, CheckConfig, CheckKind, Override};

    #[test]
    fn test_build_runs_before_dependants() {
        let ctx = context("hydra");
        let ior = checks_in(&ctx, "ior").unwrap();
        let order: Vec<&str> = dependency_order(&ior)
            .unwrap()
            .into_iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(order, vec!["iorBuildTest", "iorWriteTest", "iorReadTest"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a = RegressionCheck::new(
            CheckConfig::new("A", CheckKind::Run, "").with([Override::DependsOn("B".to_string())]),
        );
        let b = RegressionCheck::new(
            CheckConfig::new("B", CheckKind::Run, "").with([Override::DependsOn("A".to_string())]),
        );
        assert!(matches!(
            dependency_order(&[a, b]),
            Err(RegtestError::Config(_))
        ));
    }

    #[test]
    fn test_build_failure_skips_dependants() {
        let ctx = context("hydra");
        let ior = checks_in(&ctx, "ior").unwrap();
        let mut session = Session::new();

        for check in dependency_order(&ior).unwrap() {
            session
                .run(check, || {
                    Ok(match check.name() {
                        "iorBuildTest" => ExecutionRecord::new("", "configure: error: no MPI\n"),
                        _ => panic!("dependants must not be loaded"),
                    })
                });
        }

        let kinds: Vec<Option<FailureKind>> =
            session.verdicts().iter().map(|v| v.failure_kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Some(FailureKind::Build),
                Some(FailureKind::Skipped),
                Some(FailureKind::Skipped)
            ]
        );
        assert_eq!(
            session.summary(),
            Summary {
                passed: 0,
                failed: 1,
                skipped: 2
            }
        );
        assert!(!session.all_passed());
    }

    #[test]
    fn test_unloadable_output_fails_only_that_check() {
        let ctx = context("hydra");
        let osu = checks_in(&ctx, "osu").unwrap();
        let mut session = Session::new();
        for check in dependency_order(&osu).unwrap() {
            session.run(check, || match check.name() {
                "OSULatencyTest" => Err(RegtestError::io(
                    "/stage/OSULatencyTest/rfm_job.out",
                    std::io::Error::new(ErrorKind::NotFound, "missing"),
                )),
                "OSUBuildTest" => Ok(ExecutionRecord::new("", "")),
                _ => Ok(ExecutionRecord::new("8  1.0\n2048  3.1\n65536  20.4\n", "")),
            });
        }
        let latency = session
            .verdicts()
            .iter()
            .find(|v| v.check == "OSULatencyTest")
            .unwrap();
        let failure = latency.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Sanity);
        assert_eq!(failure.reason, "`rfm_job.out` was not produced by the run");
        assert_eq!(session.summary().passed, 4);
    }

    #[test]
    fn test_sanity_failure_does_not_stop_siblings() {
        let ctx = context("hydra");
        let osu = checks_in(&ctx, "osu").unwrap();
        let mut session = Session::new();
        for check in dependency_order(&osu).unwrap() {
            session
                .run(check, || {
                    Ok(match check.name() {
                        "OSUBuildTest" => ExecutionRecord::new("", ""),
                        "OSULatencyTest" => ExecutionRecord::new("no header\n", ""),
                        _ => ExecutionRecord::new("8  1.0\n2048  3.1\n65536  20.4\n", ""),
                    })
                });
        }
        let summary = session.summary();
        assert_eq!(summary.passed, 4);
        assert_eq!(summary.failed, 1);
    }
}
