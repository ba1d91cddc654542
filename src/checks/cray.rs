use super::config::{CheckConfig, CheckKind, Override, BUILD_STAGEDIR};
use super::descriptor::{find_benchmark, C_RAY};
use super::{build_check, CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};

pub const CHECKPATH: &str = "c-ray";

const EXE: &str = "c-ray-mt";
const SCENE: &str = "sphfract";

fn render_opts(src_dir: &str, resolution: &str, rays: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        format!("{}/{}/{}", BUILD_STAGEDIR, src_dir, SCENE),
        "-s".to_string(),
        resolution.to_string(),
        "-r".to_string(),
        rays.to_string(),
    ]
}

/// Thread count and output redirect go last, once the CPU count is known
fn threads_opt(config: &mut CheckConfig) {
    if let Some(cpus) = config.num_cpus_per_task {
        config
            .executable_opts
            .extend(["-t".to_string(), cpus.to_string(), ">/dev/null".to_string()]);
    }
}

fn multi_core(config: &mut CheckConfig) {
    if let Some(cpus) = config.num_cpus_per_task {
        config
            .env_vars
            .insert("OMP_NUM_THREADS".to_string(), cpus.to_string());
        config
            .env_vars
            .insert("OMP_PLACES".to_string(), "sockets".to_string());
    }
    threads_opt(config);
}

fn rules(check: RegressionCheck) -> Result<RegressionCheck> {
    let time = Extraction::int(r"^Rendering took: (\S+) seconds", Source::Stderr)?;
    Ok(check
        .sanity(vec![SanityCheck::found(r"^Rendering took:", Source::Stderr)?])
        .perf(vec![PerfRule::new("time", "s", time)]))
}

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let src_dir = find_benchmark(C_RAY)?.source_dir();

    let base = CheckConfig::new(
        "c_rayTestBase",
        CheckKind::Run,
        "c-ray ray tracing test (FPU performance)",
    )
    .with([
        Override::TimeLimit("15m".to_string()),
        Override::NumTasks(1),
        Override::NumTasksPerNode(1),
        Override::DependsOn("c_rayBuildTest".to_string()),
        Override::ExecutableFrom("c_rayBuildTest".to_string()),
        Override::Executable(format!("{}/{}", src_dir, EXE)),
    ]);

    let single = base.subclass("c_rayTestSC").with([
        Override::NumCpusPerTask(1),
        Override::ExecutableOpts(render_opts(&src_dir, "5000x2500", "4")),
    ]);
    let multi = base
        .subclass("c_rayTestMC")
        .with([Override::ExecutableOpts(render_opts(&src_dir, "7000x3500", "8"))]);

    Ok(vec![
        rules(RegressionCheck::new(single).post_init(threads_opt))?,
        rules(RegressionCheck::new(multi).post_init(multi_core))?,
        build_check("c_rayBuildTest", "c-ray build test", C_RAY)?,
    ])
}
