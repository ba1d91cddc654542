//! Check configuration records
//!
//! A check variant is a base `CheckConfig` plus an ordered list of
//! `Override`s. Values the runner must supply (`num_tasks`, `modules`, ...)
//! start out unset and are filled in by `--setvar` assignments, which may be
//! scoped to one check class (`BLASTest.exclusive_access=false`).

use crate::error::{RegtestError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Placeholder for the build check's stage directory in executable options
pub const BUILD_STAGEDIR: &str = "{build_stagedir}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Compile-only check, judged on the build output
    Build,
    /// Run-only check, judged on the job output
    Run,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckConfig {
    pub name: String,
    /// Class name `--setvar` scopes refer to; shared by parameter variants
    pub class: String,
    pub descr: String,
    pub kind: CheckKind,
    pub benchmark: Option<String>,
    pub executable: String,
    /// Build check whose stage directory holds `executable`
    pub executable_from: Option<String>,
    pub executable_opts: Vec<String>,
    pub prerun_cmds: Vec<String>,
    pub postrun_cmds: Vec<String>,
    pub num_tasks: Option<u32>,
    pub num_tasks_per_node: Option<u32>,
    pub num_cpus_per_task: Option<u32>,
    pub num_gpus_per_node: Option<u32>,
    pub exclusive_access: Option<bool>,
    pub time_limit: Option<String>,
    pub env_vars: BTreeMap<String, String>,
    pub modules: Option<Vec<String>>,
    pub tags: BTreeSet<String>,
    pub depends_on: Vec<String>,
    pub valid_systems: Option<Vec<String>>,
    pub valid_prog_environs: Option<Vec<String>>,
    /// Log file judged instead of stdout, relative to the stage directory
    pub logfile: Option<String>,
}

impl CheckConfig {
    pub fn new(name: &str, kind: CheckKind, descr: &str) -> Self {
        CheckConfig {
            name: name.to_string(),
            class: name.to_string(),
            descr: descr.to_string(),
            kind,
            benchmark: None,
            executable: String::new(),
            executable_from: None,
            executable_opts: Vec::new(),
            prerun_cmds: Vec::new(),
            postrun_cmds: Vec::new(),
            num_tasks: None,
            num_tasks_per_node: None,
            num_cpus_per_task: None,
            num_gpus_per_node: None,
            exclusive_access: None,
            time_limit: None,
            env_vars: BTreeMap::new(),
            modules: None,
            tags: BTreeSet::new(),
            depends_on: Vec::new(),
            valid_systems: None,
            valid_prog_environs: None,
            logfile: None,
        }
    }

    /// Copy renamed as a class of its own, so scoped assignments address it alone
    pub fn subclass(&self, name: &str) -> Self {
        let mut config = self.clone();
        config.name = name.to_string();
        config.class = name.to_string();
        config
    }

    /// Copy with the overrides applied in order
    pub fn with(&self, overrides: impl IntoIterator<Item = Override>) -> Self {
        let mut config = self.clone();
        for o in overrides {
            config.apply(o);
        }
        config
    }

    pub fn apply(&mut self, o: Override) {
        match o {
            Override::Name(v) => self.name = v,
            Override::Descr(v) => self.descr = v,
            Override::AppendDescr(v) => self.descr.push_str(&v),
            Override::Benchmark(v) => self.benchmark = Some(v),
            Override::Executable(v) => self.executable = v,
            Override::ExecutableFrom(v) => self.executable_from = Some(v),
            Override::ExecutableOpts(v) => self.executable_opts = v,
            Override::AppendOpts(v) => self.executable_opts.extend(v),
            Override::PrerunCmds(v) => self.prerun_cmds = v,
            Override::PostrunCmds(v) => self.postrun_cmds = v,
            Override::NumTasks(v) => self.num_tasks = Some(v),
            Override::NumTasksPerNode(v) => self.num_tasks_per_node = Some(v),
            Override::NumCpusPerTask(v) => self.num_cpus_per_task = Some(v),
            Override::NumGpusPerNode(v) => self.num_gpus_per_node = Some(v),
            Override::ExclusiveAccess(v) => self.exclusive_access = Some(v),
            Override::TimeLimit(v) => self.time_limit = Some(v),
            Override::EnvVar(k, v) => {
                self.env_vars.insert(k, v);
            }
            Override::Modules(v) => self.modules = Some(v),
            Override::Tag(v) => {
                self.tags.insert(v);
            }
            Override::DependsOn(v) => self.depends_on.push(v),
            Override::ValidSystems(v) => self.valid_systems = Some(v),
            Override::ValidProgEnvirons(v) => self.valid_prog_environs = Some(v),
            Override::Logfile(v) => self.logfile = Some(v),
        }
    }

    /// Apply the assignments that are unscoped or scoped to this check's class
    pub fn apply_setvars(&mut self, setvars: &[SetVar]) {
        for setvar in setvars {
            if setvar.applies_to(&self.class) {
                self.apply(setvar.value.clone());
            }
        }
    }

    /// Names of parameters that must be set before the check can run
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.valid_systems.is_none() {
            missing.push("valid_systems");
        }
        if self.valid_prog_environs.is_none() {
            missing.push("valid_prog_environs");
        }
        if self.num_tasks.is_none() {
            missing.push("num_tasks");
        }
        if self.num_tasks_per_node.is_none() {
            missing.push("num_tasks_per_node");
        }
        if self.num_cpus_per_task.is_none() {
            missing.push("num_cpus_per_task");
        }
        missing
    }

    /// Program and arguments, resolved against the build check's stage directory.
    ///
    /// `{build_stagedir}` in the arguments is replaced by that directory.
    pub fn resolve_command(&self, stagedirs: &BTreeMap<String, PathBuf>) -> Result<Vec<String>> {
        let Some(build) = &self.executable_from else {
            return Ok(std::iter::once(self.executable.clone())
                .chain(self.executable_opts.iter().cloned())
                .collect());
        };
        let dir = stagedirs.get(build).ok_or_else(|| {
            RegtestError::Config(format!(
                "{}: no stage directory for build check {}",
                self.name, build
            ))
        })?;
        let dir_str = dir.display().to_string();
        let program = dir.join(&self.executable).display().to_string();
        Ok(std::iter::once(program)
            .chain(
                self.executable_opts
                    .iter()
                    .map(|opt| opt.replace(BUILD_STAGEDIR, &dir_str)),
            )
            .collect())
    }

    /// Variables available to partition resource templates
    pub fn resource_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        if let Some(gpus) = self.num_gpus_per_node {
            vars.insert("num_gpus_per_node".to_string(), gpus.to_string());
        }
        vars
    }

    /// Extra files the check reads, relative to its stage directory
    pub fn logfiles(&self) -> Vec<&str> {
        self.logfile.as_deref().into_iter().collect()
    }

    pub fn stage_path(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }
}

/// A single named field assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Override {
    Name(String),
    Descr(String),
    AppendDescr(String),
    Benchmark(String),
    Executable(String),
    ExecutableFrom(String),
    ExecutableOpts(Vec<String>),
    AppendOpts(Vec<String>),
    PrerunCmds(Vec<String>),
    PostrunCmds(Vec<String>),
    NumTasks(u32),
    NumTasksPerNode(u32),
    NumCpusPerTask(u32),
    NumGpusPerNode(u32),
    ExclusiveAccess(bool),
    TimeLimit(String),
    EnvVar(String, String),
    Modules(Vec<String>),
    Tag(String),
    DependsOn(String),
    ValidSystems(Vec<String>),
    ValidProgEnvirons(Vec<String>),
    Logfile(String),
}

/// A runner `--setvar [Class.]field=value` assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetVar {
    pub scope: Option<String>,
    pub key: String,
    pub value: Override,
}

impl SetVar {
    pub fn parse(assignment: &str) -> Result<Self> {
        let (lhs, value) = assignment.split_once('=').ok_or_else(|| {
            RegtestError::InvalidArgument(format!("setvar '{}' is not key=value", assignment))
        })?;
        let (scope, key) = match lhs.split_once('.') {
            Some((scope, key)) => (Some(scope.to_string()), key),
            None => (None, lhs),
        };
        Ok(SetVar {
            scope,
            key: key.to_string(),
            value: parse_field(key, value)?,
        })
    }

    pub fn applies_to(&self, class: &str) -> bool {
        self.scope.as_deref().map_or(true, |scope| scope == class)
    }
}

fn parse_field(key: &str, value: &str) -> Result<Override> {
    let number = |v: &str| {
        v.parse::<u32>().map_err(|_| {
            RegtestError::InvalidArgument(format!("{} expects an integer, got '{}'", key, v))
        })
    };
    let list = |v: &str| -> Vec<String> {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    let field = match key {
        "num_tasks" => Override::NumTasks(number(value)?),
        "num_tasks_per_node" => Override::NumTasksPerNode(number(value)?),
        "num_cpus_per_task" => Override::NumCpusPerTask(number(value)?),
        "num_gpus_per_node" => Override::NumGpusPerNode(number(value)?),
        "exclusive_access" => match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Override::ExclusiveAccess(true),
            "false" | "no" | "0" => Override::ExclusiveAccess(false),
            other => {
                return Err(RegtestError::InvalidArgument(format!(
                    "exclusive_access expects a boolean, got '{}'",
                    other
                )))
            }
        },
        "time_limit" => Override::TimeLimit(value.to_string()),
        "modules" => Override::Modules(list(value)),
        "valid_systems" => Override::ValidSystems(list(value)),
        "valid_prog_environs" => Override::ValidProgEnvirons(list(value)),
        "executable" => Override::Executable(value.to_string()),
        "descr" => Override::Descr(value.to_string()),
        _ => {
            return Err(RegtestError::InvalidArgument(format!(
                "unknown check variable '{}'",
                key
            )))
        }
    };
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CheckConfig {
        CheckConfig::new("GMXBenchMEMBase", CheckKind::Run, "GROMACS benchMEM test").with([
            Override::Executable("gmx mdrun".to_string()),
            Override::ExecutableOpts(vec!["-s".to_string(), "benchMEM.tpr".to_string()]),
        ])
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let variant = base().with([
            Override::Name("GMXBenchMEMSingleNode".to_string()),
            Override::AppendDescr(" single node, multi-core".to_string()),
            Override::NumTasks(1),
            Override::AppendOpts(vec!["-nt".to_string(), "4".to_string()]),
            Override::NumTasks(2),
        ]);
        assert_eq!(variant.name, "GMXBenchMEMSingleNode");
        assert_eq!(variant.descr, "GROMACS benchMEM test single node, multi-core");
        assert_eq!(variant.executable_opts, vec!["-s", "benchMEM.tpr", "-nt", "4"]);
        assert_eq!(variant.num_tasks, Some(2));
        // base is untouched
        assert_eq!(base().num_tasks, None);
    }

    #[test]
    fn test_setvar_parse() {
        let scoped = SetVar::parse("BLASTest.exclusive_access=false").unwrap();
        assert_eq!(scoped.scope.as_deref(), Some("BLASTest"));
        assert_eq!(scoped.value, Override::ExclusiveAccess(false));

        let modules = SetVar::parse("modules=CP2K/7.1-intel-2020a").unwrap();
        assert_eq!(modules.scope, None);
        assert_eq!(
            modules.value,
            Override::Modules(vec!["CP2K/7.1-intel-2020a".to_string()])
        );

        assert!(SetVar::parse("num_tasks=four").is_err());
        assert!(SetVar::parse("colour=red").is_err());
        assert!(SetVar::parse("num_tasks").is_err());
    }

    #[test]
    fn test_scoped_setvars() {
        let setvars = vec![
            SetVar::parse("iorWriteTest.num_tasks=4").unwrap(),
            SetVar::parse("num_cpus_per_task=1").unwrap(),
        ];
        let mut write = CheckConfig::new("iorWriteTest", CheckKind::Run, "");
        let mut read = CheckConfig::new("iorReadTest", CheckKind::Run, "");
        write.apply_setvars(&setvars);
        read.apply_setvars(&setvars);
        assert_eq!(write.num_tasks, Some(4));
        assert_eq!(read.num_tasks, None);
        assert_eq!(read.num_cpus_per_task, Some(1));
        assert!(read.missing_required().contains(&"num_tasks"));
    }

    #[test]
    fn test_resolve_command() {
        let mut config = CheckConfig::new("c_rayTestSC", CheckKind::Run, "").with([
            Override::Executable("c-ray-1.1/c-ray-mt".to_string()),
            Override::ExecutableFrom("c_rayBuildTest".to_string()),
            Override::ExecutableOpts(vec![
                "-i".to_string(),
                "{build_stagedir}/c-ray-1.1/sphfract".to_string(),
            ]),
        ]);
        let mut stagedirs = BTreeMap::new();
        assert!(config.resolve_command(&stagedirs).is_err());

        stagedirs.insert("c_rayBuildTest".to_string(), PathBuf::from("/stage/c_rayBuildTest"));
        assert_eq!(
            config.resolve_command(&stagedirs).unwrap(),
            vec![
                "/stage/c_rayBuildTest/c-ray-1.1/c-ray-mt",
                "-i",
                "/stage/c_rayBuildTest/c-ray-1.1/sphfract"
            ]
        );

        config.executable_from = None;
        config.executable = "cp2k.popt".to_string();
        config.executable_opts = vec!["-i".to_string(), "H2O-128.inp".to_string()];
        assert_eq!(
            config.resolve_command(&stagedirs).unwrap(),
            vec!["cp2k.popt", "-i", "H2O-128.inp"]
        );
    }
}
