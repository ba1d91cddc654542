pub mod check;
pub mod checks;
pub mod fetch;
pub mod probe;
pub mod report;
pub mod run;
pub mod site;

pub use check::handle_check_command;
pub use checks::handle_checks_command;
pub use fetch::handle_fetch_command;
pub use probe::handle_probe_command;
pub use report::handle_report_command;
pub use run::handle_run_command;
pub use site::handle_site_command;

use crate::checks::{CheckContext, SetVar};
use crate::error::{RegtestError, Result};
use crate::site::SiteConfig;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Source cache root shared with the test runner
const SOURCE_PATH_VAR: &str = "REFRAME_SOURCEPATH";

/// Check tables for `system`, as the submitting user sees them
pub(crate) fn context(site: &SiteConfig, system: &str) -> Result<CheckContext> {
    site.find_system(system)?;
    let mut ctx = CheckContext::new(site, Some(system), Local::now());
    ctx.vo = std::env::var("VSC_VO").ok();
    ctx.scratch = std::env::var_os("VSC_SCRATCH_VO_USER").map(PathBuf::from);
    Ok(ctx)
}

/// Explicit root, then `$REFRAME_SOURCEPATH`, then the user cache
pub(crate) fn source_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(SOURCE_PATH_VAR) {
        return Ok(PathBuf::from(path));
    }
    dirs::cache_dir()
        .map(|dir| dir.join("hpc-regtest").join("sources"))
        .ok_or_else(|| {
            RegtestError::Config(format!("no source cache: pass --source-path or set {}", SOURCE_PATH_VAR))
        })
}

pub(crate) fn parse_setvars(raw: &[String]) -> Result<Vec<SetVar>> {
    raw.iter().map(|assignment| SetVar::parse(assignment)).collect()
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| RegtestError::io(path, e))
}
