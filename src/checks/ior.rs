use super::config::{CheckConfig, CheckKind, Override};
use super::descriptor::{find_benchmark, IOR};
use super::{build_check, CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};
use std::path::{Path, PathBuf};

pub const CHECKPATH: &str = "ior";

/// Scratch location used when the VO scratch is not known
const NO_SCRATCH: &str = "doesnotexist";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One file per MPI process, 64 MiB blocks x 256 segments, 4 MiB transfers.
///
/// `-C` reorders tasks on read-back so no process reads its own page cache,
/// `-e` forces fsync, `-D 120` stonewalls each phase after two minutes.
fn ior_opts(testfile: &Path) -> Vec<String> {
    let mut opts = vec!["-o".to_string(), testfile.display().to_string()];
    opts.extend(strings(&[
        "-t", "4m", "-b", "64m", "-s", "256", "-D", "120", "-F", "-C", "-e", "-v", "-q",
    ]));
    opts
}

fn tasks_per_node(config: &mut CheckConfig) {
    config.num_tasks_per_node = config.num_tasks;
}

pub fn checks(ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let src_dir = find_benchmark(IOR)?.source_dir();
    let testdir = ctx
        .scratch
        .clone()
        .unwrap_or_else(|| PathBuf::from(NO_SCRATCH))
        .join("reframe_iortest");
    let testfile = testdir.join("ior_testfile");

    let base = CheckConfig::new("iorTestBase", CheckKind::Run, "").with([
        Override::TimeLimit("5m".to_string()),
        Override::Executable(format!("{}/src/ior", src_dir)),
        Override::ExecutableFrom("iorBuildTest".to_string()),
        Override::ExecutableOpts(ior_opts(&testfile)),
        // ior uses MPI
        Override::NumCpusPerTask(1),
        Override::DependsOn("iorBuildTest".to_string()),
    ]);

    let write = base.subclass("iorWriteTest").with([
        Override::Descr("ior storage sequential write correctness and performance test".to_string()),
        Override::AppendOpts(strings(&["-w", "-W", "-k"])),
        Override::PrerunCmds(vec![
            format!("rm -f {}*", testfile.display()),
            format!("mkdir -p {}", testdir.display()),
        ]),
    ]);
    let read = base.subclass("iorReadTest").with([
        Override::Descr("ior storage sequential read performance test".to_string()),
        Override::DependsOn("iorWriteTest".to_string()),
        // hog 90% of node memory to evict cached pages
        Override::AppendOpts(strings(&["-r", "-M", "90%"])),
        Override::PostrunCmds(vec![format!("rm -rf {}", testdir.display())]),
    ]);

    let sanity = vec![SanityCheck::found(r"^Finished", Source::Stdout)?];
    // total bandwidth of all MPI processes combined
    let perf = vec![PerfRule::new(
        "bandwidth",
        "MiB/s",
        Extraction::float(r"^Max\s+\S+\s+(\S+)\s+MiB/sec.*", Source::Stdout)?,
    )];

    Ok(vec![
        build_check("iorBuildTest", "ior build test", IOR)?,
        RegressionCheck::new(write)
            .sanity(sanity.clone())
            .perf(perf.clone())
            .post_init(tasks_per_node),
        RegressionCheck::new(read)
            .sanity(sanity)
            .perf(perf)
            .post_init(tasks_per_node),
    ])
}
