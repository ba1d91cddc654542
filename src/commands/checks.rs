use super::{context, parse_setvars, source_root};
use crate::checks::{find_check, path_in, summaries, BuildPlan, CheckConfig, CheckKind, CheckSummary};
use crate::cli::ChecksCommands;
use crate::error::Result;
use crate::output::output_data;
use crate::sanity::{PerfRule, SanityCheck};
use crate::site::SiteConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A check as the runner would instantiate it
#[derive(Debug, Serialize)]
struct CheckDetails<'a> {
    config: CheckConfig,
    missing_required: Vec<&'static str>,
    sanity: &'a [SanityCheck],
    perf: &'a [PerfRule],
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_plan: Option<BuildPlan>,
    /// Program and arguments as they would run
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<Vec<String>>,
    /// Scheduler options per partition resource
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    resource_options: BTreeMap<String, Vec<String>>,
}

pub fn handle_checks_command(cmd: &ChecksCommands, site: &SiteConfig) -> Result<i32> {
    match cmd {
        ChecksCommands::List {
            checkpath,
            system,
            format,
        } => {
            let ctx = context(site, system)?;
            let rows = filter_summaries(summaries(&ctx)?, checkpath.as_deref());
            if format == "pretty" {
                for row in &rows {
                    println!("{:<14} {:<32} {:<5} {}", row.checkpath, row.name, kind_label(row), row.descr);
                }
            } else {
                output_data(&rows, format)?;
            }
        }
        ChecksCommands::Show {
            name,
            system,
            partition,
            environ,
            setvar,
            source_path,
            stage_root,
            format,
        } => {
            let ctx = context(site, system)?;
            let check = find_check(&ctx, name)?;
            let config = check.instantiate(&parse_setvars(setvar)?);
            let root = source_root(source_path.as_deref())?;
            let build_plan = check.build_plan(&config, environ, &root)?;

            let mut resource_options = BTreeMap::new();
            if let Some(partition) = partition {
                let partition = site.find_system(system)?.partition(partition)?;
                let vars = config.resource_vars();
                for resource in &partition.resources {
                    let options = partition.resource_options(&resource.name, &vars);
                    if !options.is_empty() {
                        resource_options.insert(resource.name.clone(), options);
                    }
                }
            }

            let details = CheckDetails {
                command: resolved_command(&config, stage_root.as_deref()),
                missing_required: config.missing_required(),
                config,
                sanity: &check.sanity,
                perf: &check.perf,
                skip: check.skip.as_deref(),
                build_plan,
                resource_options,
            };
            output_data(&details, format)?;
        }
    }
    Ok(0)
}

/// Command line of the check; programs of a build check need its stage root
fn resolved_command(config: &CheckConfig, stage_root: Option<&Path>) -> Option<Vec<String>> {
    let mut stagedirs = BTreeMap::new();
    if let (Some(root), Some(build)) = (stage_root, &config.executable_from) {
        stagedirs.insert(build.clone(), root.join(build));
    }
    match config.resolve_command(&stagedirs) {
        Ok(command) => Some(command),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

fn filter_summaries(rows: Vec<CheckSummary>, checkpath: Option<&str>) -> Vec<CheckSummary> {
    match checkpath {
        Some(checkpath) => rows
            .into_iter()
            .filter(|row| path_in(checkpath, &row.checkpath))
            .collect(),
        None => rows,
    }
}

fn kind_label(row: &CheckSummary) -> &'static str {
    match row.kind {
        CheckKind::Build => "build",
        CheckKind::Run => "run",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context as test_context;

    #[test]
    fn test_list_under_checkpath() {
        let rows = summaries(&test_context("hydra")).unwrap();
        let all = rows.len();
        let slurm = filter_summaries(rows.clone(), Some("slurm/slurm.py"));
        assert!(!slurm.is_empty());
        assert!(slurm.iter().all(|row| row.checkpath == "slurm"));
        assert_eq!(filter_summaries(rows, None).len(), all);
    }

    #[test]
    fn test_unknown_checkpath_lists_nothing() {
        let rows = summaries(&test_context("hydra")).unwrap();
        assert!(filter_summaries(rows, Some("hpl")).is_empty());
    }

    #[test]
    fn test_command_resolved_against_build_stage() {
        let check = find_check(&test_context("hydra"), "OSULatencyTest").unwrap();
        let config = check.instantiate(&[]);
        assert_eq!(resolved_command(&config, None), None);

        let command = resolved_command(&config, Some(Path::new("/stage"))).unwrap();
        assert!(command[0].starts_with("/stage/OSUBuildTest/"));
        assert!(command[0].ends_with("mpi/one-sided/osu_get_latency"));
        assert_eq!(command[1..3], ["-x".to_string(), "100".to_string()]);
    }
}
