use super::config::{CheckConfig, CheckKind, Override};
use super::{CheckContext, RegressionCheck};
use crate::error::Result;
use crate::probe::AffinityMeasure;
use crate::sanity::{SanityCheck, Source};
use std::collections::BTreeSet;

pub const CHECKPATH: &str = "slurm";

/// Set by the dispatcher in the submitting shell; a clean job must not see it
pub const OUTSIDE_VAR: &str = "TEST_ENVAR_OUTSIDE";

/// GPU partition that rejects jobs without GPUs
const GPU_ONLY_PARTITION: &str = "pascal_gpu";

/// Accounts allowed to run CPU jobs on GPU nodes
const GPU_EXEMPT_VO: &str = "bvo00005";

const PROBE_AFFINITY: &str = "regtest probe affinity --out .";
const PARTITIONS_JSON: &str = "partitions.json";

/// Submit a held job with extra options, report it and cancel it
fn held_job(options: &str) -> String {
    format!(
        "jobid=$(sbatch --parsable --wrap=hostname --hold {} | sed 's/;.*//g')\n\
         echo job submitted: $jobid\n\
         scancel $jobid\n",
        options
    )
}

fn partitions_script(max_cores_per_node: u32) -> String {
    format!(
        r#"function getpartitions {{
    jobid=$(sbatch --parsable --wrap=hostname --hold $1 | sed 's/;.*//g')
    partitions=$(squeue --noheader -o "%P" -j $jobid)
    scancel $jobid
    echo $partitions
}}

cat <<EOF >{file}
{{
    "singlenode": "$(getpartitions '-n 4')",
    "multinode": "$(getpartitions '-n 2 -N 2')",
    "manycores": "$(getpartitions '-n {cores}')",
    "gpunode": "$(getpartitions '--gpus-per-node=1')"
}}
EOF
"#,
        file = PARTITIONS_JSON,
        cores = max_cores_per_node + 1
    )
}

fn set_of<'a>(names: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    names.into_iter().cloned().collect()
}

fn partitions_eq(key: &str, expected: BTreeSet<String>, descr: &str) -> SanityCheck {
    SanityCheck::JsonSetEq {
        file: PARTITIONS_JSON.to_string(),
        pointer: format!("/{}", key),
        expected,
        msg: Some(format!("{}: {} partitions", descr, key)),
    }
}

fn affinity(measure: AffinityMeasure, expected: usize, descr: &str) -> SanityCheck {
    SanityCheck::Affinity {
        measure,
        expected,
        msg: Some(descr.to_string()),
    }
}

fn env_checks(descr: &str) -> Result<Vec<SanityCheck>> {
    Ok(vec![
        SanityCheck::found(r"^True$", Source::Stdout)?.msg(descr),
        SanityCheck::not_found(".", Source::Stderr)?.msg(format!("{}: no error messages", descr)),
    ])
}

fn variant(base: &CheckConfig, name: &str, descr: &str) -> CheckConfig {
    base.subclass(name)
        .with([Override::AppendDescr(format!(": {}", descr))])
}

pub fn checks(ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let system = ctx.system_name();
    let policy = ctx.policy.clone().unwrap_or_default();
    let no_policy = ctx.policy.is_none();
    let default_gpu = policy.gpu.first().cloned();

    let base = CheckConfig::new("SlurmTestBase", CheckKind::Run, "Slurm test").with([
        Override::TimeLimit("10m".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
        Override::NumCpusPerTask(1),
    ]);

    let mut all = Vec::new();

    let clean = variant(&base, "SbatchCleanEnv", "sbatch starts in clean environment").with([
        Override::Executable(format!(
            r#"[ -z "${{{}+x}}" ] && echo True || echo False"#,
            OUTSIDE_VAR
        )),
    ]);
    let sanity = env_checks(&clean.descr)?;
    all.push(RegressionCheck::new(clean).sanity(sanity));

    let stamp = ctx.now.timestamp();
    let copy = variant(&base, "SbatchSrunCopyEnv", "srun copies sbatch job environment").with([
        Override::PrerunCmds(vec![format!("export TEST_ENVAR_INSIDE={}", stamp)]),
        Override::Executable(format!(
            r#"srun bash -c '[ "$TEST_ENVAR_INSIDE" = "{}" ] && echo True || echo False'"#,
            stamp
        )),
    ]);
    let sanity = env_checks(&copy.descr)?;
    all.push(RegressionCheck::new(copy).sanity(sanity));

    // one core more than a GPU may have must be refused
    let (gpu_partition, cores_per_gpu) = default_gpu.clone().unwrap_or_default();
    let enforce = variant(&base, "SbatchEnforceBinding", "--gres-flags=enforce-binding set by default").with([
        // --nodes=1 works around a Slurm 23.02 bug
        Override::Executable(format!(
            "\nscontrol show job $SLURM_JOB_ID\n\
             sbatch --wrap=hostname --ntasks-per-node={} --nodes=1 --gpus-per-node=1 --partition={}\n",
            cores_per_gpu + 1,
            gpu_partition
        )),
    ]);
    let descr = enforce.descr.clone();
    let mut sanity = vec![SanityCheck::found(r"^\s*GresEnforceBind=Yes$", Source::Stdout)?.msg(&descr)];
    if system != "manticore" {
        sanity.push(
            SanityCheck::found(
                r"sbatch: error: Batch job submission failed: Requested node configuration is not available",
                Source::Stderr,
            )?
            .msg(format!("{}: requesting more cpus than available per GPU shows error", descr)),
        );
        sanity.push(
            SanityCheck::not_found(r"^Submitted batch job", Source::Stdout)?
                .msg(format!("{}: requesting more cpus than available per GPU fails", descr)),
        );
    }
    all.push(
        RegressionCheck::new(enforce)
            .sanity(sanity)
            .skip_if(default_gpu.is_none(), format!("{} has no GPU partition", system)),
    );

    // a batch step sees every CPU of the allocation as one task
    let sbatch = variant(&base, "SbatchAffinity", "sbatch affinity").with([
        Override::NumTasks(2),
        Override::NumTasksPerNode(2),
        Override::NumCpusPerTask(2),
        Override::Executable(PROBE_AFFINITY.to_string()),
    ]);
    let descr = sbatch.descr.clone();
    all.push(RegressionCheck::new(sbatch).sanity(vec![
        affinity(AffinityMeasure::Tasks, 1, &descr),
        affinity(AffinityMeasure::FirstTaskCpus, 4, &descr),
    ]));

    // --cpus-per-task gives the same binding on Slurm 22.05 to 23.11
    let srun = variant(&base, "SbatchSrunAffinity", "srun affinity").with([
        Override::NumTasks(2),
        Override::NumTasksPerNode(2),
        Override::NumCpusPerTask(2),
        Override::Executable(format!("srun --cpus-per-task=$SLURM_CPUS_PER_TASK {}", PROBE_AFFINITY)),
    ]);
    let per_task = |descr: &str| {
        vec![
            affinity(AffinityMeasure::Tasks, 2, descr),
            affinity(AffinityMeasure::FirstTaskCpus, 2, descr),
            affinity(AffinityMeasure::UniqueCpus, 4, descr),
        ]
    };
    let sanity = per_task(&srun.descr);
    all.push(RegressionCheck::new(srun).sanity(sanity));

    // tasks may land on different nodes
    let farming = variant(&base, "TaskFarmingParallel", "task farming with GNU Parallel").with([
        Override::NumTasks(2),
        Override::NumTasksPerNode(1),
        Override::NumCpusPerTask(2),
        Override::Modules(vec!["parallel".to_string()]),
        Override::Executable(format!(
            r#"seq 1 2 | parallel -N0 -j $SLURM_NTASKS "srun -n 1 -N 1 --exact --cpus-per-task=$SLURM_CPUS_PER_TASK {}""#,
            PROBE_AFFINITY
        )),
    ]);
    let sanity = per_task(&farming.descr);
    all.push(RegressionCheck::new(farming).sanity(sanity));

    let defaults = variant(&base, "DefaultPartitions", "default list of partitions").with([
        Override::Tag("local".to_string()),
        Override::Executable(partitions_script(ctx.max_cores_per_node)),
    ]);
    let descr = defaults.descr.clone();
    let mut sanity = vec![
        SanityCheck::not_found(".", Source::Stderr)?.msg(format!("{}: no error messages", descr)),
        partitions_eq("singlenode", set_of(policy.smp.iter().chain(&policy.mpi)), &descr),
        partitions_eq("multinode", set_of(&policy.mpi), &descr),
        partitions_eq("manycores", set_of(&policy.mpi), &descr),
    ];
    if let Some((partition, _)) = &default_gpu {
        sanity.push(partitions_eq("gpunode", BTreeSet::from([partition.clone()]), &descr));
    }
    all.push(
        RegressionCheck::new(defaults)
            .sanity(sanity)
            .skip_if(system == "manticore", format!("{}: skipping test on manticore", descr))
            .skip_if(no_policy, format!("no partition policy for {}", system)),
    );

    let multi_gpu = variant(&base, "WarningMultiGPU", "warning multi-GPU jobs without --ntasks-per-node").with([
        Override::Tag("local".to_string()),
        Override::Executable(held_job("--gpus-per-node=2")),
    ]);
    let descr = multi_gpu.descr.clone();
    all.push(RegressionCheck::new(multi_gpu).sanity(vec![
        SanityCheck::found(r"Please use .*--ntasks-per-node.* and .*--gpus-per-node", Source::Stderr)?.msg(&descr),
        SanityCheck::found(r"^job submitted: \d+$", Source::Stdout)?
            .msg(format!("{}: job submitted successfully", descr)),
    ]));

    let non_gpu = variant(&base, "NonGPUInGPUPartition", "non-GPU job in GPU partition").with([
        Override::Tag("local".to_string()),
        Override::Executable(held_job(&format!("--partition={}", GPU_ONLY_PARTITION))),
    ]);
    let descr = non_gpu.descr.clone();
    all.push(
        RegressionCheck::new(non_gpu)
            .sanity(vec![
                SanityCheck::found(
                    &format!("ERROR: GPU partition {} is not allowed for non-GPU jobs", GPU_ONLY_PARTITION),
                    Source::Stderr,
                )?
                .msg(format!("{}: error message", descr)),
                SanityCheck::not_found(r"^job submitted: \d+$", Source::Stdout)?
                    .msg(format!("{}: no job submitted", descr)),
            ])
            .skip_if(
                ctx.vo.as_deref() == Some(GPU_EXEMPT_VO),
                format!("{}: skipping test for {} accounts", descr, GPU_EXEMPT_VO),
            ),
    );

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::sanity::{ExecutionRecord, FailureKind};

    fn slurm(ctx: &CheckContext, name: &str) -> RegressionCheck {
        checks(ctx)
            .unwrap()
            .into_iter()
            .find(|c| c.name() == name)
            .unwrap()
    }

    fn probe_files(files: &[(&str, &str)]) -> ExecutionRecord {
        files
            .iter()
            .fold(ExecutionRecord::new("", ""), |record, (name, json)| record.with_file(*name, *json))
    }

    #[test]
    fn test_sbatch_affinity_single_task() {
        let check = slurm(&context("hydra"), "SbatchAffinity");
        let one = probe_files(&[("affinity0_0_312.json", "[312, 1312, 2312, 3312]")]);
        assert!(check.evaluate(&one).passed);

        let two = probe_files(&[
            ("affinity0_0_312.json", "[312, 1312]"),
            ("affinity1_0_312.json", "[2312, 3312]"),
        ]);
        let verdict = check.evaluate(&two);
        assert!(verdict.failure.unwrap().reason.contains("num tasks expected: 1, found: 2"));
    }

    #[test]
    fn test_srun_affinity_unique_cores() {
        let check = slurm(&context("hydra"), "SbatchSrunAffinity");
        let spread = probe_files(&[
            ("affinity0_0_312.json", "[312, 1312]"),
            ("affinity1_0_312.json", "[2312, 3312]"),
        ]);
        assert!(check.evaluate(&spread).passed);

        let shared = probe_files(&[
            ("affinity0_0_312.json", "[312, 1312]"),
            ("affinity1_0_312.json", "[312, 1312]"),
        ]);
        let verdict = check.evaluate(&shared);
        assert!(verdict.failure.unwrap().reason.contains("num unique cores expected: 4, found: 2"));
    }

    #[test]
    fn test_task_farming_runs_probe_under_parallel() {
        let check = slurm(&context("hydra"), "TaskFarmingParallel");
        assert_eq!(check.config.modules, Some(vec!["parallel".to_string()]));
        assert_eq!(check.config.num_tasks_per_node, Some(1));
        assert!(check.config.executable.contains("--exact --cpus-per-task=$SLURM_CPUS_PER_TASK regtest probe affinity"));
    }

    #[test]
    fn test_default_partitions_hydra() {
        let check = slurm(&context("hydra"), "DefaultPartitions");
        assert!(check.skip.is_none());
        assert!(check.config.executable.contains("getpartitions '-n 65'"));
        assert!(check.config.tags.contains("local"));

        let json = r#"{"singlenode": "skylake,skylake_mpi,zen4", "multinode": "skylake_mpi",
            "manycores": "skylake_mpi", "gpunode": "ampere_gpu"}"#;
        let record = ExecutionRecord::new("", "").with_file(PARTITIONS_JSON, json);
        assert!(check.evaluate(&record).passed);

        let wrong = json.replace("\"ampere_gpu\"", "\"pascal_gpu\"");
        let verdict = check.evaluate(&ExecutionRecord::new("", "").with_file(PARTITIONS_JSON, wrong));
        assert!(verdict.failure.unwrap().reason.contains("gpunode partitions"));
    }

    #[test]
    fn test_default_partitions_skipped_on_manticore() {
        let check = slurm(&context("manticore"), "DefaultPartitions");
        let verdict = check.evaluate(&ExecutionRecord::new("", ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Skipped));
    }

    #[test]
    fn test_enforce_binding_per_system() {
        let hydra = slurm(&context("hydra"), "SbatchEnforceBinding");
        assert!(hydra.config.executable.contains("--ntasks-per-node=17 --nodes=1 --gpus-per-node=1 --partition=ampere_gpu"));
        assert_eq!(hydra.sanity.len(), 3);

        let manticore = slurm(&context("manticore"), "SbatchEnforceBinding");
        assert!(manticore.config.executable.contains("--ntasks-per-node=3"));
        assert_eq!(manticore.sanity.len(), 1);
        let record = ExecutionRecord::new("   GresEnforceBind=Yes\nSubmitted batch job 12\n", "");
        assert!(manticore.evaluate(&record).passed);

        let chimera = slurm(&context("chimera"), "SbatchEnforceBinding");
        assert!(chimera.skip.is_some());
    }

    #[test]
    fn test_non_gpu_job_skipped_for_exempt_vo() {
        let mut ctx = context("hydra");
        assert!(slurm(&ctx, "NonGPUInGPUPartition").skip.is_none());
        ctx.vo = Some(GPU_EXEMPT_VO.to_string());
        assert!(slurm(&ctx, "NonGPUInGPUPartition").skip.is_some());
    }

    #[test]
    fn test_clean_env() {
        let check = slurm(&context("hydra"), "SbatchCleanEnv");
        assert!(check.config.executable.contains("${TEST_ENVAR_OUTSIDE+x}"));
        assert!(check.evaluate(&ExecutionRecord::new("True\n", "")).passed);
        let verdict = check.evaluate(&ExecutionRecord::new("True\n", "srun: warning\n"));
        assert!(verdict.failure.unwrap().reason.contains("no error messages"));
    }

    #[test]
    fn test_srun_copy_env_uses_timestamp() {
        let ctx = context("hydra");
        let check = slurm(&ctx, "SbatchSrunCopyEnv");
        assert_eq!(
            check.config.prerun_cmds,
            vec![format!("export TEST_ENVAR_INSIDE={}", ctx.now.timestamp())]
        );
    }
}
