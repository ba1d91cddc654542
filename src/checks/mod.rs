//! Regression checks: configuration plus the rules that judge their output
//!
//! Every family module exposes `checks(&CheckContext)`, returning its check
//! variants with their sanity and performance rule tables.

pub mod blas;
pub mod config;
pub mod cp2k;
pub mod cray;
pub mod descriptor;
pub mod gromacs;
pub mod ior;
pub mod lmod;
pub mod osu;
pub mod session;
pub mod slurm;
pub mod slurm_gpu;

pub use config::{CheckConfig, CheckKind, Override, SetVar};
pub use descriptor::{benchmarks, find_benchmark, BenchmarkDescriptor};
pub use session::{dependency_order, Session};

use crate::error::{RegtestError, Result};
use crate::sanity::{assess, ExecutionRecord, PerfRule, SanityCheck, Source, Stage, Verdict};
use crate::site::{PartitionPolicy, SiteConfig};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Facts the check tables depend on, passed in rather than read from the environment
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub now: DateTime<Local>,
    pub system: Option<String>,
    pub policy: Option<PartitionPolicy>,
    pub max_cores_per_node: u32,
    /// Virtual organisation of the submitting user (`VSC_VO`)
    pub vo: Option<String>,
    /// Per-user scratch directory of the VO (`VSC_SCRATCH_VO_USER`)
    pub scratch: Option<PathBuf>,
}

impl CheckContext {
    pub fn new(site: &SiteConfig, system: Option<&str>, now: DateTime<Local>) -> Self {
        CheckContext {
            now,
            system: system.map(str::to_string),
            policy: system.and_then(|s| site.policies.get(s).cloned()),
            max_cores_per_node: site.general.max_cores_per_node,
            vo: None,
            scratch: None,
        }
    }

    pub fn system_name(&self) -> &str {
        self.system.as_deref().unwrap_or("hydra")
    }
}

/// Build-time parameters derived from the environment a build runs in
pub type BuildOptions = fn(&CheckConfig, &str) -> Vec<String>;

/// One check variant and the rules that judge it
#[derive(Debug, Clone, Serialize)]
pub struct RegressionCheck {
    pub config: CheckConfig,
    pub sanity: Vec<SanityCheck>,
    pub perf: Vec<PerfRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    #[serde(skip)]
    post_init: Option<fn(&mut CheckConfig)>,
    #[serde(skip)]
    build_options: Option<BuildOptions>,
}

/// Shell steps that prepare and compile a benchmark
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildPlan {
    pub prebuild: Vec<String>,
    pub build: Vec<String>,
}

impl RegressionCheck {
    pub fn new(config: CheckConfig) -> Self {
        RegressionCheck {
            config,
            sanity: Vec::new(),
            perf: Vec::new(),
            skip: None,
            post_init: None,
            build_options: None,
        }
    }

    pub fn sanity(mut self, checks: Vec<SanityCheck>) -> Self {
        self.sanity = checks;
        self
    }

    pub fn perf(mut self, rules: Vec<PerfRule>) -> Self {
        self.perf = rules;
        self
    }

    /// Derive fields from runner-supplied values once they are known
    pub fn post_init(mut self, hook: fn(&mut CheckConfig)) -> Self {
        self.post_init = Some(hook);
        self
    }

    pub fn build_options(mut self, options: BuildOptions) -> Self {
        self.build_options = Some(options);
        self
    }

    pub fn skip_if(mut self, condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            self.skip = Some(reason.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn stage(&self) -> Stage {
        match self.config.kind {
            CheckKind::Build => Stage::Build,
            CheckKind::Run => Stage::Run,
        }
    }

    /// Configuration after runner assignments and post-init hooks
    pub fn instantiate(&self, setvars: &[SetVar]) -> CheckConfig {
        let mut config = self.config.clone();
        config.apply_setvars(setvars);
        if let Some(hook) = self.post_init {
            hook(&mut config);
        }
        config
    }

    pub fn build_plan(
        &self,
        config: &CheckConfig,
        environ: &str,
        source_root: &Path,
    ) -> Result<Option<BuildPlan>> {
        let Some(name) = &config.benchmark else {
            return Ok(None);
        };
        let descriptor = find_benchmark(name)?;
        let archive_exists = descriptor.source_path(source_root).is_file();
        let options = self
            .build_options
            .map(|f| f(config, environ))
            .unwrap_or_default();
        Ok(Some(BuildPlan {
            prebuild: descriptor.prebuild_commands(source_root, archive_exists),
            build: descriptor.build_commands(config.num_cpus_per_task.unwrap_or(1), &options),
        }))
    }

    /// Read the captured output of this check from its stage directory
    pub fn load_record(&self, stagedir: &Path) -> Result<ExecutionRecord> {
        ExecutionRecord::from_stagedir(stagedir, &self.config.logfiles())
    }

    pub fn evaluate(&self, record: &ExecutionRecord) -> Verdict {
        if let Some(reason) = &self.skip {
            debug!("{}: skipped: {}", self.name(), reason);
            return Verdict::not_applicable(self.name(), reason);
        }
        assess(self.name(), self.stage(), &self.sanity, &self.perf, record)
    }
}

/// Compile-only check of a benchmark; any `error` in the build stderr fails it
pub(crate) fn build_check(name: &str, descr: &str, benchmark: &str) -> Result<RegressionCheck> {
    let config = CheckConfig::new(name, CheckKind::Build, descr).with([
        Override::Benchmark(benchmark.to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
    ]);
    Ok(RegressionCheck::new(config)
        .sanity(vec![SanityCheck::not_found("error", Source::Stderr)?]))
}

/// `OMP_NUM_THREADS` follows the CPUs given to each task
pub(crate) fn omp_threads_from_cpus(config: &mut CheckConfig) {
    if let Some(cpus) = config.num_cpus_per_task {
        config
            .env_vars
            .insert("OMP_NUM_THREADS".to_string(), cpus.to_string());
    }
}

pub type Family = fn(&CheckContext) -> Result<Vec<RegressionCheck>>;

/// Check directories and the families they hold
pub const FAMILIES: &[(&str, Family)] = &[
    (blas::CHECKPATH, blas::checks),
    (cray::CHECKPATH, cray::checks),
    (cp2k::CHECKPATH, cp2k::checks),
    (gromacs::CHECKPATH, gromacs::checks),
    (ior::CHECKPATH, ior::checks),
    (lmod::CHECKPATH, lmod::checks),
    (osu::CHECKPATH, osu::checks),
    (slurm::CHECKPATH, slurm::checks),
    (slurm_gpu::CHECKPATH, slurm_gpu::checks),
];

/// Row of `checks list`
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub checkpath: String,
    pub name: String,
    pub kind: CheckKind,
    pub descr: String,
}

/// Every check of every family, paired with its check directory
pub fn all_checks(ctx: &CheckContext) -> Result<Vec<(&'static str, RegressionCheck)>> {
    let mut all = Vec::new();
    for (checkpath, family) in FAMILIES {
        for check in family(ctx)? {
            all.push((*checkpath, check));
        }
    }
    Ok(all)
}

/// Checks under a check path such as `blas-tester` or `blas-tester/blas.py`
pub fn checks_in(ctx: &CheckContext, checkpath: &str) -> Result<Vec<RegressionCheck>> {
    Ok(all_checks(ctx)?
        .into_iter()
        .filter(|(dir, _)| path_in(checkpath, dir))
        .map(|(_, check)| check)
        .collect())
}

/// Whether `checkpath` is the directory `dir` or lies below it
pub fn path_in(checkpath: &str, dir: &str) -> bool {
    let path = checkpath.trim_start_matches("./");
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn find_check(ctx: &CheckContext, name: &str) -> Result<RegressionCheck> {
    all_checks(ctx)?
        .into_iter()
        .map(|(_, check)| check)
        .find(|check| check.name() == name)
        .ok_or_else(|| RegtestError::UnknownCheck(name.to_string()))
}

pub fn summaries(ctx: &CheckContext) -> Result<Vec<CheckSummary>> {
    Ok(all_checks(ctx)?
        .into_iter()
        .map(|(checkpath, check)| CheckSummary {
            checkpath: checkpath.to_string(),
            name: check.config.name,
            kind: check.config.kind,
            descr: check.config.descr,
        })
        .collect())
}
