use crate::error::{RegtestError, Result};
use crate::sanity::PerfValue;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One performance record, one line per metric
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerfLogRecord {
    pub username: String,
    pub version: String,
    pub commit: String,
    pub name: String,
    pub system: String,
    pub partition: String,
    pub environ: String,
    pub num_tasks: u32,
    pub num_cpus_per_task: u32,
    pub num_tasks_per_node: u32,
    pub modules: Vec<String>,
    pub jobid: String,
    pub perf_var: String,
    pub perf_value: String,
    pub unit: String,
}

impl PerfLogRecord {
    /// Copy of `self` carrying one extracted metric
    pub fn for_metric(&self, value: &PerfValue) -> Self {
        PerfLogRecord {
            perf_var: value.key.clone(),
            perf_value: value.value.to_string(),
            unit: value.unit.clone(),
            ..self.clone()
        }
    }

    /// `reframe: username=..|version=..|...|unit=..`
    pub fn format_line(&self) -> String {
        let fields = [
            ("username", self.username.clone()),
            ("version", self.version.clone()),
            ("commit", self.commit.clone()),
            ("name", self.name.clone()),
            ("system", self.system.clone()),
            ("partition", self.partition.clone()),
            ("environ", self.environ.clone()),
            ("num_tasks", self.num_tasks.to_string()),
            ("num_cpus_per_task", self.num_cpus_per_task.to_string()),
            ("num_tasks_per_node", self.num_tasks_per_node.to_string()),
            ("modules", self.modules.join(",")),
            ("jobid", self.jobid.clone()),
            ("perf_var", self.perf_var.clone()),
            ("perf_value", self.perf_value.clone()),
            ("unit", self.unit.clone()),
        ];
        let body: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        format!("reframe: {}", body.join("|"))
    }

    /// `<root>/<system>/<partition>/<name>.log`
    pub fn log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.system)
            .join(&self.partition)
            .join(format!("{}.log", self.name))
    }
}

/// Append one timestamped line to the record's perf log, creating directories
pub fn append(root: &Path, record: &PerfLogRecord, completed: DateTime<Local>) -> Result<PathBuf> {
    let path = record.log_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RegtestError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| RegtestError::io(&path, e))?;
    writeln!(file, "{} {}", completed.to_rfc3339(), record.format_line())
        .map_err(|e| RegtestError::io(&path, e))?;
    info!("{}: {}={} appended to {}", record.name, record.perf_var, record.perf_value, path.display());
    Ok(path)
}
