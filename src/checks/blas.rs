use super::config::{CheckConfig, CheckKind, Override};
use super::descriptor::{find_benchmark, BLAS_TESTER};
use super::{build_check, omp_threads_from_cpus, CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};

pub const CHECKPATH: &str = "blas-tester";

/// Level-3 testers, one per precision
const EXES: [&str; 4] = ["xcl3", "xdl3", "xsl3", "xzl3"];

/// Row of the tester's result table holding the reported speed
const TEST_INDEX: &str = "9";

/// Make variables for the BLAS-Tester build; the tested library follows the toolchain
pub fn build_options(config: &CheckConfig, environ: &str) -> Vec<String> {
    let threads = config.num_cpus_per_task.unwrap_or(1);
    let mut options = vec![
        "CODEBITS=-Wno-implicit-function-declaration".to_string(),
        format!("NUMTHREADS={}", threads),
        "USE_OPENMP=1".to_string(),
        "L2SIZE=$(getconf LEVEL2_CACHE_SIZE)".to_string(),
    ];
    if environ.starts_with("foss") {
        options.push("TEST_BLAS=$EBROOTOPENBLAS/lib/libopenblas.so".to_string());
    } else if environ.starts_with("intel") {
        options.extend([
            "TEST_BLAS=$MKLROOT/lib/intel64/libmkl.so".to_string(),
            "F_INTERFACE_INTEL=1".to_string(),
            "LIBS=\"-liomp5 -lpthread\"".to_string(),
        ]);
    }
    options
}

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let src_dir = find_benchmark(BLAS_TESTER)?.source_dir();

    let base = CheckConfig::new("BLASTest", CheckKind::Run, "BLAS correctness and performance tests")
        .with([
            Override::TimeLimit("10m".to_string()),
            Override::NumTasks(1),
            Override::NumTasksPerNode(1),
            Override::DependsOn("BLASBuildTest".to_string()),
            Override::ExecutableFrom("BLASBuildTest".to_string()),
        ]);

    let mut checks = Vec::with_capacity(EXES.len() + 1);
    for exe in EXES {
        let config = base.with([
            Override::Name(format!("BLASTest_{}", exe)),
            Override::Descr(format!("BLAS-Tester {} test", exe)),
            Override::Executable(format!("{}/bin/{}blastst", src_dir, exe)),
        ]);
        let speed = Extraction::float(
            &format!(r"^\s+{}.*\s+(\S+)\s+\S+\s+PASS", TEST_INDEX),
            Source::Stdout,
        )?;
        checks.push(
            RegressionCheck::new(config)
                .sanity(vec![SanityCheck::found(r"^10 tests run, 10 passed", Source::Stdout)?])
                .perf(vec![PerfRule::new("speed", "MFLOPS", speed)])
                .post_init(omp_threads_from_cpus),
        );
    }

    checks.push(
        build_check("BLASBuildTest", "BLAS-Tester build test", BLAS_TESTER)?
            .build_options(build_options),
    );
    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::checks::SetVar;
    use crate::sanity::{ExecutionRecord, FailureKind, Number};

    const XDL3_OUTPUT: &str = "\
----------------------------------- GEMM ------------------------------------
TST# A B    M    N    K ALPHA  LDA  LDB  BETA  LDC  TIME MFLOP  SpUp  TEST
==== = = ==== ==== ==== ===== ==== ==== ===== ==== ===== ===== ===== =====
   0 N N  100  100  100   1.0 1000 1000   1.0 1000  0.00  10.0  1.00  PASS
   1 N N  200  200  200   1.0 1000 1000   1.0 1000  0.00  80.0  1.00  PASS
   9 N N 1000 1000 1000   1.0 1000 1000   1.0 1000  0.05 40123.4  1.00  PASS
10 tests run, 10 passed
";

    fn xdl3() -> RegressionCheck {
        checks(&context("hydra"))
            .unwrap()
            .into_iter()
            .find(|c| c.name() == "BLASTest_xdl3")
            .unwrap()
    }

    #[test]
    fn test_speed_from_row_nine() {
        let verdict = xdl3().evaluate(&ExecutionRecord::new(XDL3_OUTPUT, ""));
        assert!(verdict.passed, "{:?}", verdict.failure);
        assert_eq!(verdict.metrics[0].key, "speed");
        assert_eq!(verdict.metrics[0].value, Number::Float(40123.4));
        assert_eq!(verdict.metrics[0].unit, "MFLOPS");
    }

    #[test]
    fn test_failed_test_count_is_sanity_failure() {
        let altered = XDL3_OUTPUT.replace("10 tests run, 10 passed", "10 tests run, 9 passed");
        let verdict = xdl3().evaluate(&ExecutionRecord::new(altered, ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Sanity));
    }

    #[test]
    fn test_missing_row_is_extraction_failure() {
        let altered = XDL3_OUTPUT.replace("   9 N N", "   8 N N");
        let verdict = xdl3().evaluate(&ExecutionRecord::new(altered, ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Extraction));
    }

    #[test]
    fn test_variants_share_scope() {
        let setvars = vec![
            SetVar::parse("num_cpus_per_task=4").unwrap(),
            SetVar::parse("BLASTest.exclusive_access=false").unwrap(),
        ];
        let config = xdl3().instantiate(&setvars);
        assert_eq!(config.exclusive_access, Some(false));
        assert_eq!(config.env_vars["OMP_NUM_THREADS"], "4");
        assert_eq!(config.executable, "BLAS-Tester-20160411/bin/xdl3blastst");
    }

    #[test]
    fn test_build_options_follow_toolchain() {
        let config = CheckConfig::new("BLASBuildTest", CheckKind::Build, "")
            .with([Override::NumCpusPerTask(4)]);
        let foss = build_options(&config, "foss-2021a");
        assert!(foss.contains(&"NUMTHREADS=4".to_string()));
        assert!(foss.contains(&"TEST_BLAS=$EBROOTOPENBLAS/lib/libopenblas.so".to_string()));

        let intel = build_options(&config, "intel-2021a");
        assert!(intel.contains(&"F_INTERFACE_INTEL=1".to_string()));
        assert!(!intel.iter().any(|o| o.contains("openblas")));

        assert_eq!(build_options(&config, "builtin").len(), 4);
    }
}
