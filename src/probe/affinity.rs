use crate::error::{RegtestError, Result};
use crate::sanity::ExecutionRecord;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Affinity values are `cpu * NODE_STRIDE + node_id` so they stay unique across nodes
pub const NODE_STRIDE: u64 = 1000;

const FILE_PREFIX: &str = "affinity";
const FILE_SUFFIX: &str = ".json";

/// What to count over the collected affinity files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityMeasure {
    /// Number of tasks that reported
    Tasks,
    /// CPUs seen by the first task
    FirstTaskCpus,
    /// Distinct CPUs across all tasks and nodes
    UniqueCpus,
}

impl AffinityMeasure {
    pub fn measure(&self, affinities: &[Vec<u64>]) -> usize {
        match self {
            AffinityMeasure::Tasks => affinities.len(),
            AffinityMeasure::FirstTaskCpus => affinities.first().map_or(0, Vec::len),
            AffinityMeasure::UniqueCpus => affinities
                .iter()
                .flatten()
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }
}

impl fmt::Display for AffinityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffinityMeasure::Tasks => f.write_str("num tasks"),
            AffinityMeasure::FirstTaskCpus => f.write_str("num cpus per task"),
            AffinityMeasure::UniqueCpus => f.write_str("num unique cores"),
        }
    }
}

/// Parameters of one probe task, as seen from inside the job step
#[derive(Debug, Clone)]
pub struct AffinityProbe {
    pub hostname: String,
    pub procid: Option<String>,
    pub step_id: Option<String>,
    pub hold: Duration,
}

impl AffinityProbe {
    /// Build from the Slurm task variables and the local hostname
    pub fn from_env() -> Result<Self> {
        let hostname = sysinfo::System::host_name()
            .ok_or_else(|| RegtestError::Probe("cannot determine hostname".to_string()))?;
        Ok(AffinityProbe {
            hostname,
            procid: std::env::var("SLURM_PROCID").ok(),
            step_id: std::env::var("SLURM_STEP_ID").ok(),
            hold: Duration::from_secs(20),
        })
    }

    pub fn task_id(&self) -> String {
        format!(
            "{}_{}",
            self.procid.as_deref().unwrap_or("0"),
            self.step_id.as_deref().unwrap_or("0")
        )
    }

    /// Record this task's CPU affinity into `out_dir`, then hold the CPUs
    /// so that concurrently started tasks overlap in time.
    pub fn run(&self, out_dir: &Path) -> Result<PathBuf> {
        let node = node_id(&self.hostname)?;
        let cpus = allowed_cpus()?;
        let affinity = encode(&cpus, node);

        let path = out_dir.join(format!(
            "{}{}_{}{}",
            FILE_PREFIX,
            self.task_id(),
            node,
            FILE_SUFFIX
        ));
        let json = serde_json::to_string(&affinity)?;
        fs::write(&path, json).map_err(|e| RegtestError::io(&path, e))?;
        info!("wrote {} cpus to {}", affinity.len(), path.display());

        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
        Ok(path)
    }
}

/// Numeric node id from a host name like `node312.hydra.os`
pub fn node_id(hostname: &str) -> Result<u64> {
    let short = hostname.split('.').next().unwrap_or_default();
    short
        .strip_prefix("node")
        .and_then(|id| id.parse::<u64>().ok())
        .ok_or_else(|| RegtestError::Probe(format!("hostname '{}' has no node id", hostname)))
}

pub fn encode(cpus: &[u32], node_id: u64) -> Vec<u64> {
    cpus.iter()
        .map(|&cpu| u64::from(cpu) * NODE_STRIDE + node_id)
        .collect()
}

/// CPUs this process may run on, from `/proc/self/status`
pub fn allowed_cpus() -> Result<Vec<u32>> {
    let status = procfs::process::Process::myself()
        .and_then(|p| p.status())
        .map_err(|e| RegtestError::Probe(format!("cannot read process status: {}", e)))?;

    let ranges = status
        .cpus_allowed_list
        .ok_or_else(|| RegtestError::Probe("Cpus_allowed_list not reported".to_string()))?;

    Ok(ranges
        .into_iter()
        .flat_map(|(first, last)| first..=last)
        .collect())
}

/// Affinity lists from the `affinity*.json` files attached to a record
pub fn affinities_from_record(record: &ExecutionRecord) -> Result<Vec<Vec<u64>>> {
    record
        .files_matching(FILE_PREFIX, FILE_SUFFIX)
        .map(|(name, contents)| {
            serde_json::from_str::<Vec<u64>>(contents)
                .map_err(|e| RegtestError::Probe(format!("{}: {}", name, e)))
        })
        .collect()
}
