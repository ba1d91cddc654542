use super::affinity::allowed_cpus;
use crate::error::{RegtestError, Result};
use nvml_wrapper::Nvml;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::info;

pub const BINDING_FILE: &str = "gpu_binding.json";

/// Allocated CPUs next to the CPUs closest to each visible GPU
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuBinding {
    pub alloc_cpus: Vec<u32>,
    /// Keyed `affinity_gpu_<index>`
    #[serde(flatten)]
    pub gpus: BTreeMap<String, Vec<u32>>,
}

/// Expand an NVML CPU-affinity bitmask into CPU ids.
///
/// Each word covers 64 CPUs, least significant word first.
pub fn decode_cpu_mask(words: &[u64]) -> Vec<u32> {
    let mut cpus = Vec::new();
    for (w, word) in words.iter().enumerate() {
        for bit in 0..64u32 {
            if word & (1u64 << bit) != 0 {
                cpus.push(w as u32 * 64 + bit);
            }
        }
    }
    cpus
}

/// Query NVML for the CPU affinity of every device
pub fn collect() -> Result<GpuBinding> {
    let nvml = Nvml::init().map_err(|e| RegtestError::Probe(format!("NVML init failed: {}", e)))?;
    let device_count = nvml
        .device_count()
        .map_err(|e| RegtestError::Probe(format!("cannot count GPUs: {}", e)))?;

    let mut sys = System::new_all();
    sys.refresh_all();
    let cpuset_size = sys.cpus().len().div_ceil(64).max(1);

    let mut gpus = BTreeMap::new();
    for i in 0..device_count {
        let device = nvml
            .device_by_index(i)
            .map_err(|e| RegtestError::Probe(format!("GPU {}: {}", i, e)))?;
        let words: Vec<u64> = device
            .cpu_affinity(cpuset_size)
            .map_err(|e| RegtestError::Probe(format!("GPU {} cpu affinity: {}", i, e)))?
            .into_iter()
            .map(|w| w as u64)
            .collect();
        gpus.insert(format!("affinity_gpu_{}", i), decode_cpu_mask(&words));
    }

    Ok(GpuBinding {
        alloc_cpus: allowed_cpus()?,
        gpus,
    })
}

pub fn write(binding: &GpuBinding, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(BINDING_FILE);
    let json = serde_json::to_string(binding)?;
    fs::write(&path, json).map_err(|e| RegtestError::io(&path, e))?;
    info!("wrote GPU binding for {} devices to {}", binding.gpus.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_word() {
        assert_eq!(decode_cpu_mask(&[0b1011]), vec![0, 1, 3]);
        assert!(decode_cpu_mask(&[0]).is_empty());
    }

    #[test]
    fn test_decode_second_word_offsets_by_64() {
        assert_eq!(decode_cpu_mask(&[1 << 63, 0b11]), vec![63, 64, 65]);
    }

    #[test]
    fn test_binding_json_layout() {
        let mut gpus = BTreeMap::new();
        gpus.insert("affinity_gpu_0".to_string(), vec![0, 1, 2]);
        let binding = GpuBinding {
            alloc_cpus: vec![0, 1, 2],
            gpus,
        };
        let value = serde_json::to_value(&binding).unwrap();
        assert_eq!(value["alloc_cpus"], value["affinity_gpu_0"]);
    }

    #[test]
    fn test_write() {
        let dir = tempfile::tempdir().unwrap();
        let binding = GpuBinding {
            alloc_cpus: vec![4],
            gpus: BTreeMap::new(),
        };
        let path = write(&binding, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), r#"{"alloc_cpus":[4]}"#);
    }
}
