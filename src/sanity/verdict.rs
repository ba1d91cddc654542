use super::check::{assert_all, SanityCheck};
use super::extract::{PerfRule, PerfValue};
use super::record::ExecutionRecord;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Which kind of step produced the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Build,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Build step reported an error; dependants are not attempted
    Build,
    /// Output did not show the expected behaviour
    Sanity,
    /// Performance numbers could not be located unambiguously
    Extraction,
    /// Not attempted because a dependency failed
    Skipped,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Build => "build failure",
            FailureKind::Sanity => "sanity failure",
            FailureKind::Extraction => "extraction failure",
            FailureKind::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of one test instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub check: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub metrics: Vec<PerfValue>,
    /// Exit status of the judged run, when it was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
}

impl Verdict {
    fn failed(check: &str, kind: FailureKind, reason: String) -> Self {
        Verdict {
            check: check.to_string(),
            passed: false,
            failure: Some(Failure { kind, reason }),
            metrics: Vec::new(),
            exit_status: None,
        }
    }

    pub fn skipped(check: &str, failed_dependency: &str) -> Self {
        Self::failed(
            check,
            FailureKind::Skipped,
            format!("dependency {} failed", failed_dependency),
        )
    }

    /// Output of the run could not be read; judged as a sanity failure
    pub fn unreadable(check: &str, reason: String) -> Self {
        Self::failed(check, FailureKind::Sanity, reason)
    }

    /// Not attempted on this system
    pub fn not_applicable(check: &str, reason: &str) -> Self {
        Self::failed(check, FailureKind::Skipped, reason.to_string())
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Judge one completed run.
///
/// Sanity is evaluated first; performance values are only extracted once it
/// passed. Every metric must extract, otherwise the whole instance is an
/// extraction failure and no metric is reported.
pub fn assess(
    check: &str,
    stage: Stage,
    sanity: &[SanityCheck],
    perf: &[PerfRule],
    record: &ExecutionRecord,
) -> Verdict {
    let mut verdict = judge(check, stage, sanity, perf, record);
    verdict.exit_status = record.exit_status();
    verdict
}

fn judge(
    check: &str,
    stage: Stage,
    sanity: &[SanityCheck],
    perf: &[PerfRule],
    record: &ExecutionRecord,
) -> Verdict {
    if let Err(failure) = assert_all(sanity, record) {
        let kind = match stage {
            Stage::Build => FailureKind::Build,
            Stage::Run => FailureKind::Sanity,
        };
        warn!("{}: {}: {}", check, kind, failure);
        return Verdict::failed(check, kind, failure.message);
    }

    let mut metrics = Vec::with_capacity(perf.len());
    for rule in perf {
        match rule.extract(record) {
            Ok(value) => {
                debug!("{}: {} = {} {}", check, value.key, value.value, value.unit);
                metrics.push(value);
            }
            Err(failure) => {
                warn!("{}: extraction of {} failed: {}", check, rule.key, failure);
                return Verdict::failed(
                    check,
                    FailureKind::Extraction,
                    format!("{}: {}", rule.key, failure),
                );
            }
        }
    }

    Verdict {
        check: check.to_string(),
        passed: true,
        failure: None,
        metrics,
        exit_status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanity::{Extraction, Number, Source};

    fn rules() -> (Vec<SanityCheck>, Vec<PerfRule>) {
        let sanity = vec![SanityCheck::found(r"^Finished", Source::Stdout).unwrap()];
        let perf = vec![PerfRule::new(
            "bandwidth",
            "MiB/s",
            Extraction::float(r"^Max\s+\S+\s+(\S+)\s+MiB/sec.*", Source::Stdout).unwrap(),
        )];
        (sanity, perf)
    }

    #[test]
    fn test_pass_with_metrics() {
        let (sanity, perf) = rules();
        let record = ExecutionRecord::new(
            "Max Write: 2345.67 MiB/sec (2459.63 MB/sec)\nFinished            : Tue Oct 19\n",
            "",
        );
        let verdict = assess("iorWriteTest", Stage::Run, &sanity, &perf, &record);
        assert!(verdict.passed);
        assert_eq!(verdict.metrics[0].value, Number::Float(2345.67));
        assert_eq!(verdict.metrics[0].unit, "MiB/s");
    }

    #[test]
    fn test_sanity_failure_skips_extraction() {
        let (sanity, perf) = rules();
        let record = ExecutionRecord::new("Max Write: 2345.67 MiB/sec (2459.63 MB/sec)\n", "");
        let verdict = assess("iorWriteTest", Stage::Run, &sanity, &perf, &record);
        assert!(!verdict.passed);
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Sanity));
        assert!(verdict.metrics.is_empty());
    }

    #[test]
    fn test_extraction_failure_is_distinct() {
        let (sanity, perf) = rules();
        let record = ExecutionRecord::new("Finished\n", "");
        let verdict = assess("iorWriteTest", Stage::Run, &sanity, &perf, &record);
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Extraction));
        assert!(verdict.failure.unwrap().reason.starts_with("bandwidth"));
    }

    #[test]
    fn test_build_stage_failure() {
        let sanity = vec![SanityCheck::not_found("error", Source::Stderr).unwrap()];
        let record = ExecutionRecord::new("", "foo.c:12: error: implicit declaration\n");
        let verdict = assess("BLASBuildTest", Stage::Build, &sanity, &[], &record);
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Build));
    }

    #[test]
    fn test_exit_status_is_carried() {
        let (sanity, perf) = rules();
        let record = ExecutionRecord::new("Finished\n", "").with_exit_status(137);
        let verdict = assess("iorWriteTest", Stage::Run, &sanity, &perf, &record);
        assert_eq!(verdict.exit_status, Some(137));
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["exit_status"], 137);

        let unrecorded = assess("iorWriteTest", Stage::Run, &sanity, &perf, &ExecutionRecord::new("", ""));
        assert!(serde_json::to_value(&unrecorded).unwrap().get("exit_status").is_none());
    }
}
