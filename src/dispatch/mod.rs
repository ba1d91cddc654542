//! Test dispatcher: resolves a check path to one test-runner invocation
//!
//! A selector (check path, optional check name, target system) is matched
//! against the definition table. Exactly one definition must match; its
//! valid systems, programming environments and variable assignments are
//! rendered into the runner command line.

pub mod table;

pub use table::DEFINITIONS;

use crate::checks::path_in;
use crate::error::{RegtestError, Result};
use serde::Serialize;
use std::process::Command;
use tracing::{debug, info};

/// Test runner executable
pub const RUNNER: &str = "reframe";

/// Programming environment used when a definition names none
const DEFAULT_ENVIRON: &str = "builtin";

#[derive(Debug, Clone, Serialize)]
pub struct TestDefinition {
    pub checkpath: &'static str,
    pub name: Option<&'static str>,
    pub valid_prog_environs: Option<&'static [&'static str]>,
    /// Qualified `system:partition` names per system
    pub valid_systems: &'static [(&'static str, &'static [&'static str])],
    /// `--setvar` assignments, optionally scoped as `Class.key`
    pub setvar_extra: &'static [(&'static str, &'static str)],
    /// Further `--key value` runner options
    pub extra: &'static [(&'static str, &'static str)],
    /// Variables set for the runner process only
    pub env: &'static [(&'static str, &'static str)],
}

impl TestDefinition {
    pub fn label(&self) -> String {
        match self.name {
            Some(name) => format!("{}/{}", self.checkpath, name),
            None => self.checkpath.to_string(),
        }
    }

    fn systems_for(&self, system: &str) -> Option<&'static [&'static str]> {
        self.valid_systems
            .iter()
            .find(|(s, _)| *s == system)
            .map(|(_, partitions)| *partitions)
    }
}

/// What the user asked to run
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub checkpath: String,
    pub name: Option<String>,
    pub system: String,
    /// Replace the definition's valid systems with `system:partition` for each
    pub partitions: Vec<String>,
    /// Replace the definition's programming environments
    pub valid_prog_environs: Vec<String>,
    /// Passed to the runner unchanged, after everything else
    pub passthrough: Vec<String>,
}

/// Definitions matching the check path and, when both give one, the name
pub fn candidates<'a>(
    definitions: &'a [TestDefinition],
    checkpath: &str,
    name: Option<&str>,
) -> Vec<&'a TestDefinition> {
    definitions
        .iter()
        .filter(|def| path_in(checkpath, def.checkpath))
        .filter(|def| match (name, def.name) {
            (Some(wanted), Some(own)) => wanted == own,
            _ => true,
        })
        .collect()
}

/// The single definition a selector resolves to
pub fn select<'a>(
    definitions: &'a [TestDefinition],
    checkpath: &str,
    name: Option<&str>,
) -> Result<&'a TestDefinition> {
    let found = candidates(definitions, checkpath, name);
    debug!("{} definitions match {}", found.len(), checkpath);
    match found.as_slice() {
        [one] => Ok(one),
        _ => Err(RegtestError::Selection {
            count: found.len(),
            candidates: found.iter().map(|def| def.label()).collect(),
        }),
    }
}

/// A fully rendered runner command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn build(def: &TestDefinition, selector: &Selector) -> Result<Self> {
        let valid_systems: Vec<String> = if selector.partitions.is_empty() {
            def.systems_for(&selector.system)
                .ok_or_else(|| {
                    RegtestError::InvalidArgument(format!(
                        "{} has no valid systems on {}",
                        def.label(),
                        selector.system
                    ))
                })?
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            selector
                .partitions
                .iter()
                .map(|p| format!("{}:{}", selector.system, p))
                .collect()
        };

        let environs: Vec<String> = if !selector.valid_prog_environs.is_empty() {
            selector.valid_prog_environs.clone()
        } else {
            def.valid_prog_environs
                .unwrap_or(&[DEFAULT_ENVIRON])
                .iter()
                .map(|s| s.to_string())
                .collect()
        };

        let name = selector.name.as_deref().or(def.name);

        let mut args = vec![
            "--run".to_string(),
            "--checkpath".to_string(),
            selector.checkpath.clone(),
        ];
        if let Some(name) = name {
            args.extend(["--name".to_string(), name.to_string()]);
        }
        args.extend(["--system".to_string(), selector.system.clone()]);
        let mut assignments = vec![
            format!("valid_prog_environs={}", environs.join(",")),
            format!("valid_systems={}", valid_systems.join(",")),
        ];
        assignments.extend(
            def.setvar_extra
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        for assignment in assignments {
            args.extend(["--setvar".to_string(), assignment]);
        }
        for (key, value) in def.extra {
            args.extend([format!("--{}", key), value.to_string()]);
        }
        args.extend(selector.passthrough.iter().cloned());

        Ok(Invocation {
            program: RUNNER.to_string(),
            args,
            env: def
                .env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Command line as printed before it runs
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and hand back its exit status
    pub fn execute(&self) -> Result<i32> {
        info!("running {}", self.render());
        let status = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .status()
            .map_err(|e| RegtestError::Launch {
                program: self.program.clone(),
                source: e,
            })?;
        debug!("{} exited with {}", self.program, status);
        // killed by a signal
        Ok(status.code().unwrap_or(1))
    }
}
