use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub systems: Vec<System>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    /// Scheduler partition policy per system, as enforced by the submit filter
    #[serde(default)]
    pub policies: BTreeMap<String, PartitionPolicy>,
    #[serde(default)]
    pub general: General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub name: String,
    pub descr: String,
    /// Regular expressions matched against the login host name
    pub hostnames: Vec<String>,
    pub modules_system: String,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    Slurm,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Launcher {
    Local,
    Srun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub scheduler: Scheduler,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub access: Vec<String>,
    pub environs: Vec<String>,
    pub descr: String,
    pub max_jobs: u32,
    pub launcher: Launcher,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Named scheduler resource with option templates like `--gres=gpu:{num_gpus_per_node}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<String>,
    pub cc: String,
    pub cxx: String,
    pub ftn: String,
}

/// Partitions the submit filter routes jobs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionPolicy {
    /// `(partition, max cores per GPU)`, default GPU partition first
    pub gpu: Vec<(String, u32)>,
    pub smp: Vec<String>,
    pub mpi: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct General {
    pub check_search_path: Vec<String>,
    pub check_search_recursive: bool,
    pub purge_environment: bool,
    pub resolve_module_conflicts: bool,
    pub keep_stage_files: bool,
    pub max_cores_per_node: u32,
}

impl Default for General {
    fn default() -> Self {
        General {
            check_search_path: vec!["checks/".to_string()],
            check_search_recursive: true,
            purge_environment: true,
            resolve_module_conflicts: false,
            keep_stage_files: true,
            max_cores_per_node: 64,
        }
    }
}
