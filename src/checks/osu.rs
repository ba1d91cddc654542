use super::config::{CheckConfig, CheckKind, Override};
use super::descriptor::{find_benchmark, OSU};
use super::{build_check, CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};

pub const CHECKPATH: &str = "osu";

/// Message sizes the metrics are read at, in bytes
const SIZE_SMALL: u32 = 2 << 10;
const SIZE_BIG: u32 = 64 << 10;

#[derive(Debug, Clone, Copy)]
enum Measure {
    Latency,
    Bandwidth,
}

fn size_rows(measure: Measure) -> Result<Vec<PerfRule>> {
    let (prefix, unit) = match measure {
        Measure::Latency => ("latency", "us"),
        Measure::Bandwidth => ("bandwidth", "MB/s"),
    };
    let row = |size: u32| Extraction::float(&format!(r"^{}\s+(\S+)", size), Source::Stdout);
    Ok(vec![
        PerfRule::new(&format!("{}_small", prefix), unit, row(SIZE_SMALL)?),
        PerfRule::new(&format!("{}_big", prefix), unit, row(SIZE_BIG)?),
    ])
}

/// `-x` warm-up iterations, `-i` timed iterations, `-m` largest message size
fn variant(
    base: &CheckConfig,
    name: &str,
    descr: &str,
    exe: &str,
    opts: &[&str],
    tag: &str,
) -> CheckConfig {
    base.subclass(name).with([
        Override::Descr(descr.to_string()),
        Override::Executable(format!("{}/{}", base.executable, exe)),
        Override::ExecutableOpts(opts.iter().map(|s| s.to_string()).collect()),
        Override::Tag(tag.to_string()),
    ])
}

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let src_dir = find_benchmark(OSU)?.source_dir();

    let base = CheckConfig::new("OSUTestBase", CheckKind::Run, "").with([
        Override::NumTasksPerNode(1),
        Override::NumCpusPerTask(1),
        Override::TimeLimit("15m".to_string()),
        Override::DependsOn("OSUBuildTest".to_string()),
        Override::ExecutableFrom("OSUBuildTest".to_string()),
        Override::Executable(format!("{}/mpi", src_dir)),
    ]);
    let big = SIZE_BIG.to_string();

    let latency = variant(&base, "OSULatencyTest", "OSU latency test",
        "one-sided/osu_get_latency", &["-x", "100", "-i", "10000"], "prod_small");
    let bandwidth = variant(&base, "OSUBandwidthTest", "OSU bandwidth test",
        "one-sided/osu_get_bw", &["-x", "100", "-i", "5000", "-m", big.as_str()], "prod_small");
    let alltoall = variant(&base, "OSUAlltoallTest", "OSU Alltoall test",
        "collective/osu_alltoall", &["-x", "1000", "-i", "20000"], "prod_big");
    let allreduce = variant(&base, "OSUAllreduceTest", "OSU Allreduce test",
        "collective/osu_allreduce", &["-x", "1000", "-i", "20000"], "prod_big");

    // the first data row, 8 bytes, shows the benchmark ran
    let header = SanityCheck::found(r"^8", Source::Stdout)?;
    let run = |config: CheckConfig, measure: Measure| -> Result<RegressionCheck> {
        Ok(RegressionCheck::new(config)
            .sanity(vec![header.clone()])
            .perf(size_rows(measure)?))
    };

    let mut build = build_check("OSUBuildTest", "OSU benchmarks build test", OSU)?;
    build.config.tags.extend(["prod_small".to_string(), "prod_big".to_string()]);

    Ok(vec![
        run(latency, Measure::Latency)?,
        run(bandwidth, Measure::Bandwidth)?,
        run(alltoall, Measure::Latency)?,
        run(allreduce, Measure::Latency)?,
        build,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::sanity::{ExecutionRecord, FailureKind, Number};

    const GET_LATENCY: &str = "\
# OSU MPI_Get latency Test v5.6.2
# Window creation: MPI_Win_allocate
# Synchronization: MPI_Win_flush
# Size          Latency (us)
1                       1.41
2                       1.40
4                       1.40
8                       1.41
2048                    2.85
65536                  12.03
";

    const GET_BW: &str = "\
# OSU MPI_Get Bandwidth Test v5.6.2
# Size      Bandwidth (MB/s)
1                       2.61
8                      20.95
2048                 4567.89
65536               11876.30
";

    fn check(name: &str) -> RegressionCheck {
        checks(&context("hydra"))
            .unwrap()
            .into_iter()
            .find(|c| c.name() == name)
            .unwrap()
    }

    #[test]
    fn test_latency_rows() {
        let verdict = check("OSULatencyTest").evaluate(&ExecutionRecord::new(GET_LATENCY, ""));
        assert!(verdict.passed, "{:?}", verdict.failure);
        let keys: Vec<(&str, f64, &str)> = verdict
            .metrics
            .iter()
            .map(|m| (m.key.as_str(), m.value.as_f64(), m.unit.as_str()))
            .collect();
        assert_eq!(keys, vec![("latency_small", 2.85, "us"), ("latency_big", 12.03, "us")]);
    }

    #[test]
    fn test_bandwidth_rows() {
        let verdict = check("OSUBandwidthTest").evaluate(&ExecutionRecord::new(GET_BW, ""));
        assert!(verdict.passed);
        assert_eq!(verdict.metrics[1].key, "bandwidth_big");
        assert_eq!(verdict.metrics[1].value, Number::Float(11876.30));
        assert_eq!(verdict.metrics[1].unit, "MB/s");
    }

    #[test]
    fn test_no_data_rows() {
        let verdict = check("OSUAllreduceTest")
            .evaluate(&ExecutionRecord::new("# OSU MPI Allreduce Latency Test v5.6.2\n", ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Sanity));
    }

    #[test]
    fn test_truncated_output_is_extraction_failure() {
        let cut: String = GET_LATENCY.lines().take(8).map(|l| format!("{}\n", l)).collect();
        let verdict = check("OSULatencyTest").evaluate(&ExecutionRecord::new(cut, ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Extraction));
    }

    #[test]
    fn test_executables_and_tags() {
        let bw = check("OSUBandwidthTest");
        assert_eq!(bw.config.executable, "osu-micro-benchmarks-5.6.2/mpi/one-sided/osu_get_bw");
        assert_eq!(bw.config.executable_opts.last().unwrap(), "65536");
        assert!(bw.config.tags.contains("prod_small"));
        assert!(check("OSUBuildTest").config.tags.contains("prod_big"));
    }
}
