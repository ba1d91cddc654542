use super::config::{CheckConfig, CheckKind, Override};
use super::descriptor::{find_benchmark, BENCH_MEM};
use super::{omp_threads_from_cpus, CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};

pub const CHECKPATH: &str = "gromacs_bench";

fn single_node(config: &mut CheckConfig) {
    if let Some(cpus) = config.num_cpus_per_task {
        config
            .executable_opts
            .extend(["-nt".to_string(), cpus.to_string()]);
    }
    omp_threads_from_cpus(config);
}

fn multi_node(config: &mut CheckConfig) {
    if let Some(per_node) = config.num_tasks_per_node {
        config
            .executable_opts
            .extend(["-ntomp".to_string(), per_node.to_string()]);
    }
}

fn single_node_gpu(config: &mut CheckConfig) {
    config.num_tasks_per_node = config.num_tasks;
    single_node(config);
}

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let bench = find_benchmark(BENCH_MEM)?;
    let logfile = format!("{}/md.log", bench.source_dir());
    let log = Source::file(logfile.as_str());

    let base = CheckConfig::new("GMXBenchMEMBase", CheckKind::Run, "GROMACS benchMEM test").with([
        Override::Benchmark(bench.name.clone()),
        Override::ValidProgEnvirons(vec!["default".to_string()]),
        Override::TimeLimit("10m".to_string()),
        Override::ExecutableOpts(
            ["-s", "benchMEM.tpr", "-nsteps", "12000", "-resetstep", "7000"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        Override::Logfile(logfile.clone()),
    ]);

    let finished = SanityCheck::found(r"^Finished mdrun", log.clone())?;
    let perf = vec![PerfRule::new(
        "perf",
        "ns/day",
        Extraction::float(r"^Performance:\s+(\S+)\s+\S+", log.clone())?,
    )];

    let single = base.subclass("GMXBenchMEMSingleNode").with([
        Override::AppendDescr(" single node, multi-core".to_string()),
        Override::Executable("gmx mdrun".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
    ]);
    let multi = base.subclass("GMXBenchMEMMultiNode").with([
        Override::AppendDescr(" multi-node".to_string()),
        Override::Executable("gmx_mpi mdrun".to_string()),
        Override::NumCpusPerTask(1),
        Override::EnvVar(
            "OMPI_MCA_rmaps_base_mapping_policy".to_string(),
            "socket".to_string(),
        ),
    ]);
    let gpu = base.subclass("GMXBenchMEMSingleNodeGPU").with([
        Override::AppendDescr(" single node, multi-core, 1 or more gpus".to_string()),
        Override::Executable("gmx mdrun".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
    ]);

    Ok(vec![
        RegressionCheck::new(single)
            .sanity(vec![finished.clone()])
            .perf(perf.clone())
            .post_init(single_node),
        RegressionCheck::new(multi)
            .sanity(vec![finished.clone()])
            .perf(perf.clone())
            .post_init(multi_node),
        RegressionCheck::new(gpu)
            .sanity(vec![
                finished,
                SanityCheck::found(r"^1 GPU selected for this run.", log)?,
            ])
            .perf(perf)
            .post_init(single_node_gpu),
    ])
}
