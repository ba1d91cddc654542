use super::context;
use crate::checks::session::Summary;
use crate::checks::{checks_in, dependency_order, RegressionCheck, Session};
use crate::cli::ReportArgs;
use crate::error::{RegtestError, Result};
use crate::output::{output_data, output_verdicts, print_info};
use crate::sanity::{ExecutionRecord, Verdict};
use crate::site::SiteConfig;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

pub fn handle_report_command(args: &ReportArgs, site: &SiteConfig) -> Result<i32> {
    let ctx = context(site, &args.system)?;
    let checks = checks_in(&ctx, &args.checkpath)?;
    if checks.is_empty() {
        return Err(RegtestError::InvalidArgument(format!(
            "no checks under {}",
            args.checkpath
        )));
    }

    let session = judge(&checks, &args.stage_root)?;
    let summary = session.summary();

    if args.format == "pretty" {
        output_verdicts(session.verdicts(), &args.format)?;
        print_info(&format!(
            "{} passed, {} failed, {} skipped",
            summary.passed, summary.failed, summary.skipped
        ));
    } else {
        output_data(
            &Report {
                verdicts: session.verdicts(),
                summary,
            },
            &args.format,
        )?;
    }

    Ok(if summary.failed == 0 { 0 } else { 1 })
}

#[derive(Serialize)]
struct Report<'a> {
    verdicts: &'a [Verdict],
    summary: Summary,
}

/// Judge checks in dependency order from `<stage_root>/<check name>`
fn judge(checks: &[RegressionCheck], stage_root: &Path) -> Result<Session> {
    let mut session = Session::new();
    for check in dependency_order(checks)? {
        if check.skip.is_some() {
            session.run(check, || Ok(ExecutionRecord::default()));
            continue;
        }
        let stagedir = check.config.stage_path(stage_root);
        if !stagedir.is_dir() {
            warn!("{}: no stage directory at {}", check.name(), stagedir.display());
            continue;
        }
        session.run(check, || check.load_record(&stagedir));
    }
    Ok(session)
}
