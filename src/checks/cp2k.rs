use super::config::{CheckConfig, CheckKind, Override};
use super::descriptor::CP2K;
use super::{CheckContext, RegressionCheck};
use crate::error::Result;
use crate::sanity::{Extraction, PerfRule, SanityCheck, Source};

pub const CHECKPATH: &str = "cp2k_tests";

const TESTFILE: &str = "H2O-128";

/// Total energy of the H2O-128 benchmark, in Hartree
pub const ENERGY_REFERENCE: f64 = -2202.1791;
pub const ENERGY_TOLERANCE: f64 = 1e-4;
pub const STEP_COUNT: usize = 10;

const ENERGY: &str = r"\s+ENERGY\| Total FORCE_EVAL \( QS \) energy \(a\.u\.\):\s+(?P<energy>\S+)";
const TIMING: &str = r"^ CP2K(\s+[\d\.]+){4}\s+(?P<perf>\S+)";

fn tasks_fill_node(config: &mut CheckConfig) {
    config.num_tasks_per_node = config.num_tasks;
}

fn sanity() -> Result<Vec<SanityCheck>> {
    // the SCF energy is printed once per MD step; the last one is judged
    let energy = Extraction::float(ENERGY, Source::Stdout)?
        .named("energy")
        .last();
    Ok(vec![
        SanityCheck::found(r"PROGRAM STOPPED IN", Source::Stdout)?,
        SanityCheck::count(r"STEP NUM", Source::Stdout, STEP_COUNT)?,
        SanityCheck::within(energy, ENERGY_REFERENCE, ENERGY_TOLERANCE),
    ])
}

fn perf() -> Result<Vec<PerfRule>> {
    let time = Extraction::float(TIMING, Source::Stdout)?.named("perf");
    Ok(vec![PerfRule::new("time", "s", time)])
}

pub fn checks(_ctx: &CheckContext) -> Result<Vec<RegressionCheck>> {
    let base = CheckConfig::new("CP2KTestBase", CheckKind::Run, &format!("CP2K test {}", TESTFILE))
        .with([
            Override::Benchmark(CP2K.to_string()),
            Override::ValidProgEnvirons(vec!["builtin".to_string()]),
            Override::Executable("cp2k.popt".to_string()),
            Override::ExecutableOpts(vec!["-i".to_string(), format!("{}.inp", TESTFILE)]),
            Override::TimeLimit("20m".to_string()),
            // necessary when running with MPI
            Override::EnvVar("OMP_NUM_THREADS".to_string(), "1".to_string()),
            Override::NumCpusPerTask(1),
        ]);

    let single = base
        .subclass("CP2KTestSingleNode")
        .with([Override::AppendDescr(" single-node, multi-core".to_string())]);
    let multi = base
        .subclass("CP2KTestMultiNode")
        .with([Override::AppendDescr(" multi-node".to_string())]);

    Ok(vec![
        RegressionCheck::new(single)
            .sanity(sanity()?)
            .perf(perf()?)
            .post_init(tasks_fill_node),
        RegressionCheck::new(multi).sanity(sanity()?).perf(perf()?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::tests::context;
    use crate::sanity::{ExecutionRecord, FailureKind, Number};

    fn output(final_energy: &str, steps: usize) -> String {
        let mut out = String::from(" DBCSR| Multiplication driver                                               XSMM\n");
        for step in 1..=steps {
            out.push_str(&format!(
                " STEP NUMBER                    {}\n \
                 ENERGY| Total FORCE_EVAL ( QS ) energy (a.u.):            -2202.{:04}00000000\n",
                step,
                1700 + step
            ));
        }
        out.push_str(&format!(
            " ENERGY| Total FORCE_EVAL ( QS ) energy (a.u.):            {}\n",
            final_energy
        ));
        out.push_str(
            " -------------------------------------------------------------------------------\n \
             SUBROUTINE                       CALLS  ASD         SELF TIME        TOTAL TIME\n \
             CP2K                                 1  1.0    0.074    0.081  166.403  166.404\n \
             PROGRAM STOPPED IN /tmp/cp2k\n",
        );
        out
    }

    fn check() -> RegressionCheck {
        checks(&context("hydra")).unwrap().remove(0)
    }

    #[test]
    fn test_reference_energy_passes() {
        let verdict = check().evaluate(&ExecutionRecord::new(output("-2202.179146", 10), ""));
        assert!(verdict.passed, "{:?}", verdict.failure);
        assert_eq!(verdict.metrics[0].key, "time");
        assert_eq!(verdict.metrics[0].value, Number::Float(166.403));
    }

    #[test]
    fn test_energy_off_by_more_than_tolerance() {
        let verdict = check().evaluate(&ExecutionRecord::new(output("-2202.1793", 10), ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Sanity));
        assert!(verdict.failure.unwrap().reason.contains("tolerance"));
    }

    #[test]
    fn test_step_count() {
        let verdict = check().evaluate(&ExecutionRecord::new(output("-2202.1791", 9), ""));
        assert_eq!(verdict.failure_kind(), Some(FailureKind::Sanity));
        assert!(verdict.failure.unwrap().reason.contains("matched 9 times"));
    }

    #[test]
    fn test_single_node_fills_node() {
        let config = check().instantiate(&[
            crate::checks::SetVar::parse("num_tasks=4").unwrap(),
        ]);
        assert_eq!(config.num_tasks_per_node, Some(4));
        assert_eq!(config.name, "CP2KTestSingleNode");
    }

    #[test]
    fn test_multi_node_needs_tasks_per_node() {
        let multi = checks(&context("hydra")).unwrap().remove(1);
        assert!(multi.instantiate(&[]).missing_required().contains(&"num_tasks_per_node"));

        let placed = multi.instantiate(&[
            crate::checks::SetVar::parse("num_tasks=4").unwrap(),
            crate::checks::SetVar::parse("CP2KTestMultiNode.num_tasks_per_node=1").unwrap(),
        ]);
        assert_eq!(placed.name, "CP2KTestMultiNode");
        assert!(!placed.missing_required().contains(&"num_tasks_per_node"));
        assert!(!placed.missing_required().contains(&"num_tasks"));
    }
}
