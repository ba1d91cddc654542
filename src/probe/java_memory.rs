use crate::error::{RegtestError, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const CGROUP_MEMORY_ROOT: &str = "/sys/fs/cgroup/memory";
const LIMIT_FILE: &str = "memory.memsw.limit_in_bytes";

/// Java modules set `-Xmx` to this share of the job's memory limit
const HEAP_SHARE: f64 = 0.8;

/// Memory cgroup of the job, with the per-task suffix removed
pub fn job_cgroup(pathname: &str) -> &str {
    match pathname.rsplit_once('/') {
        Some((parent, last))
            if last
                .strip_prefix("task_")
                .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())) =>
        {
            parent
        }
        _ => pathname,
    }
}

/// Heap size in bytes from `JAVA_TOOL_OPTIONS`, e.g. `-Xmx8589934592`
pub fn heap_size(tool_options: &str) -> Option<u64> {
    tool_options
        .split_whitespace()
        .find_map(|opt| opt.strip_prefix("-Xmx"))
        .and_then(|size| size.parse().ok())
}

pub fn heap_matches(limit: u64, heap: u64) -> bool {
    (limit as f64 * HEAP_SHARE) as u64 == heap
}

fn limit_path() -> Result<PathBuf> {
    let cgroups = procfs::process::Process::myself()
        .and_then(|p| p.cgroups())
        .map_err(|e| RegtestError::Probe(format!("cannot read cgroups: {}", e)))?;
    let memory = cgroups
        .into_iter()
        .find(|cg| cg.controllers.iter().any(|c| c == "memory"))
        .ok_or_else(|| RegtestError::Probe("no memory cgroup".to_string()))?;
    let cgroup = job_cgroup(&memory.pathname);
    Ok(PathBuf::from(format!("{}{}", CGROUP_MEMORY_ROOT, cgroup)).join(LIMIT_FILE))
}

/// Whether the Java heap of the loaded module follows the job memory limit
pub fn check() -> Result<bool> {
    let path = limit_path()?;
    let text = fs::read_to_string(&path).map_err(|e| RegtestError::io(&path, e))?;
    let limit: u64 = text
        .trim()
        .parse()
        .map_err(|_| RegtestError::Probe(format!("bad memory limit '{}'", text.trim())))?;
    let options = std::env::var("JAVA_TOOL_OPTIONS")
        .map_err(|_| RegtestError::Probe("JAVA_TOOL_OPTIONS is not set".to_string()))?;
    let heap = heap_size(&options)
        .ok_or_else(|| RegtestError::Probe(format!("no -Xmx in '{}'", options)))?;
    debug!("memory limit {} bytes, java heap {} bytes", limit, heap);
    Ok(heap_matches(limit, heap))
}
