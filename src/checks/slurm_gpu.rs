use super::config::{CheckConfig, CheckKind, Override};
use super::{CheckContext, RegressionCheck};
use crate::error::Result;
use crate::probe::gpu_binding::BINDING_FILE;
use crate::sanity::SanityCheck;

pub const CHECKPATH: &str = "slurm_gpu";

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let config = CheckConfig::new(
        "GPUBinding",
        CheckKind::Run,
        "Slurm GPU test: allocated CPUs are on the same socket as the allocated GPU",
    )
    .with([
        Override::TimeLimit("10m".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
        Override::NumCpusPerTask(3),
        Override::NumGpusPerNode(1),
        Override::Executable("regtest probe gpu-binding --out .".to_string()),
    ]);

    Ok(vec![RegressionCheck::new(config).sanity(vec![SanityCheck::JsonFieldsEq {
        file: BINDING_FILE.to_string(),
        left: "/alloc_cpus".to_string(),
        right: "/affinity_gpu_0".to_string(),
        msg: Some("allocated cpus should be equal to gpu-cpu affinity".to_string()),
    }])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::sanity::{ExecutionRecord, FailureKind};

    fn binding(json: &str) -> ExecutionRecord {
        ExecutionRecord::new("", "").with_file(BINDING_FILE, json)
    }

    #[test]
    fn test_cpus_next_to_gpu() {
        let check = checks(&context("hydra")).unwrap().remove(0);
        let same = binding(r#"{"alloc_cpus": [0, 1, 2], "affinity_gpu_0": [0, 1, 2]}"#);
        assert!(check.evaluate(&same).passed);

        let other_socket = binding(r#"{"alloc_cpus": [16, 17, 18], "affinity_gpu_0": [0, 1, 2]}"#);
        assert_eq!(check.evaluate(&other_socket).failure_kind(), Some(FailureKind::Sanity));
    }

    #[test]
    fn test_no_gpu_visible() {
        let check = checks(&context("hydra")).unwrap().remove(0);
        let verdict = check.evaluate(&binding(r#"{"alloc_cpus": [0, 1, 2]}"#));
        assert!(verdict.failure.unwrap().reason.contains("has no field /affinity_gpu_0"));
    }

    #[test]
    fn test_requests_one_gpu() {
        let config = checks(&context("hydra")).unwrap().remove(0).instantiate(&[]);
        assert_eq!(config.resource_vars()["num_gpus_per_node"], "1");
        assert_eq!(config.num_cpus_per_task, Some(3));
    }
}
