use super::{context, parse_setvars, read_text};
use crate::checks::{find_check, CheckConfig, RegressionCheck};
use crate::cli::CheckArgs;
use crate::error::{RegtestError, Result};
use crate::output::output_verdicts;
use crate::sanity::{ExecutionRecord, Verdict};
use crate::site::{perflog, syslog_level, PerfLogRecord, SiteConfig};
use chrono::Local;
use std::path::Path;
use tracing::{info, warn};

pub fn handle_check_command(args: &CheckArgs, site: &SiteConfig) -> Result<i32> {
    let ctx = context(site, &args.system)?;
    let check = find_check(&ctx, &args.name)?;
    let record = load_record(&check, args)?;
    let verdict = check.evaluate(&record);

    if let Some(root) = &args.perflog {
        let config = check.instantiate(&parse_setvars(&args.setvar)?);
        let base = PerfLogRecord {
            username: std::env::var("USER").unwrap_or_default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            system: args.system.clone(),
            partition: args.partition.clone().unwrap_or_default(),
            environ: args.environ.clone().unwrap_or_default(),
            jobid: args.jobid.clone(),
            ..perf_base(&config)
        };
        write_perflog(root, &base, &verdict)?;
    }

    output_verdicts(std::slice::from_ref(&verdict), &args.format)?;
    Ok(if verdict.passed { 0 } else { 1 })
}

fn load_record(check: &RegressionCheck, args: &CheckArgs) -> Result<ExecutionRecord> {
    let mut record = match (&args.stagedir, &args.stdout, &args.stderr) {
        (Some(dir), _, _) => check.load_record(dir)?,
        (None, Some(stdout), Some(stderr)) => {
            ExecutionRecord::new(read_text(stdout)?, read_text(stderr)?)
        }
        _ => {
            return Err(RegtestError::InvalidArgument(
                "give --stagedir, or --stdout together with --stderr".to_string(),
            ))
        }
    };
    for spec in &args.files {
        let (name, path) = parse_file_arg(spec)?;
        record = record.with_file(name, read_text(path)?);
    }
    if let Some(status) = args.exit_status {
        record = record.with_exit_status(status);
    }
    Ok(record)
}

/// `NAME=PATH` of a produced file
fn parse_file_arg(spec: &str) -> Result<(&str, &Path)> {
    match spec.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name, Path::new(path))),
        _ => Err(RegtestError::InvalidArgument(format!(
            "--file '{}' is not NAME=PATH",
            spec
        ))),
    }
}

/// Fields of a perf record that come from the instantiated check
fn perf_base(config: &CheckConfig) -> PerfLogRecord {
    PerfLogRecord {
        name: config.name.clone(),
        num_tasks: config.num_tasks.unwrap_or(1),
        num_cpus_per_task: config.num_cpus_per_task.unwrap_or(1),
        num_tasks_per_node: config.num_tasks_per_node.unwrap_or(1),
        modules: config.modules.clone().unwrap_or_default(),
        ..Default::default()
    }
}

/// One perf log line per metric of a passed verdict
fn write_perflog(root: &Path, base: &PerfLogRecord, verdict: &Verdict) -> Result<usize> {
    if !verdict.passed {
        info!("{}: not passed, no perf records", verdict.check);
        return Ok(0);
    }
    let completed = Local::now();
    for metric in &verdict.metrics {
        let record = base.for_metric(metric);
        let path = perflog::append(root, &record, completed)?;
        let line = record.format_line();
        if syslog_level(&base.username) == "info" {
            info!(target: "perflog", "{} ({})", line, path.display());
        } else {
            warn!(target: "perflog", "{} ({})", line, path.display());
        }
    }
    Ok(verdict.metrics.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context as test_context;
    use crate::checks::SetVar;
    use crate::sanity::{Number, PerfValue};
    use std::fs;

    fn args(name: &str) -> CheckArgs {
        CheckArgs {
            name: name.to_string(),
            stagedir: None,
            stdout: None,
            stderr: None,
            files: Vec::new(),
            exit_status: None,
            system: "hydra".to_string(),
            setvar: Vec::new(),
            perflog: None,
            partition: None,
            environ: None,
            jobid: String::new(),
            format: "json".to_string(),
        }
    }

    #[test]
    fn test_file_arg() {
        let (name, path) = parse_file_arg("ld_lib_path=/tmp/out").unwrap();
        assert_eq!(name, "ld_lib_path");
        assert_eq!(path, Path::new("/tmp/out"));
        assert!(parse_file_arg("ld_lib_path").is_err());
        assert!(parse_file_arg("=/tmp/out").is_err());
    }

    #[test]
    fn test_record_from_captured_streams() {
        let dir = tempfile::tempdir().unwrap();
        let stdout = dir.path().join("out");
        let stderr = dir.path().join("err");
        let produced = dir.path().join("produced");
        fs::write(&stdout, "hello\n").unwrap();
        fs::write(&stderr, "").unwrap();
        fs::write(&produced, "42\n").unwrap();

        let check = find_check(&test_context("hydra"), "LmodTestPurge").unwrap();
        let mut args = args("LmodTestPurge");
        args.stdout = Some(stdout);
        args.stderr = Some(stderr);
        args.files = vec![format!("env_prerun={}", produced.display())];
        args.exit_status = Some(0);

        let record = load_record(&check, &args).unwrap();
        assert_eq!(record.exit_status(), Some(0));
        assert_eq!(
            record.text(&crate::sanity::Source::file("env_prerun")),
            Some("42\n")
        );
    }

    #[test]
    fn test_record_needs_a_source() {
        let check = find_check(&test_context("hydra"), "LmodTestPurge").unwrap();
        assert!(matches!(
            load_record(&check, &args("LmodTestPurge")),
            Err(RegtestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_perf_base_follows_setvars() {
        let check = find_check(&test_context("hydra"), "OSULatencyTest").unwrap();
        let setvars = vec![SetVar::parse("OSULatencyTest.num_tasks=2").unwrap()];
        let base = perf_base(&check.instantiate(&setvars));
        assert_eq!(base.name, "OSULatencyTest");
        assert_eq!(base.num_tasks, 2);
        assert_eq!(base.num_tasks_per_node, 1);
    }

    #[test]
    fn test_perflog_only_for_passed_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let base = PerfLogRecord {
            name: "OSULatencyTest".to_string(),
            system: "hydra".to_string(),
            partition: "skylake-mn-mpi-ib".to_string(),
            ..Default::default()
        };
        let mut verdict = Verdict {
            check: "OSULatencyTest".to_string(),
            passed: true,
            failure: None,
            metrics: vec![
                PerfValue {
                    key: "latency_small".to_string(),
                    value: Number::Float(1.5),
                    unit: "us".to_string(),
                },
                PerfValue {
                    key: "latency_big".to_string(),
                    value: Number::Float(9.25),
                    unit: "us".to_string(),
                },
            ],
            exit_status: None,
        };
        assert_eq!(write_perflog(dir.path(), &base, &verdict).unwrap(), 2);
        let log = fs::read_to_string(base.log_path(dir.path())).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("perf_var=latency_big|perf_value=9.25|unit=us"));

        verdict.passed = false;
        assert_eq!(write_perflog(dir.path(), &base, &verdict).unwrap(), 0);
    }
}
