use crate::cli::ProbeCommands;
use crate::error::Result;
use crate::probe::{gpu_binding, java_memory, AffinityProbe};
use std::time::Duration;
use tracing::info;

pub fn handle_probe_command(cmd: &ProbeCommands) -> Result<i32> {
    match cmd {
        ProbeCommands::Affinity { out, hold } => {
            let mut probe = AffinityProbe::from_env()?;
            probe.hold = Duration::from_secs(*hold);
            probe.run(out)?;
        }
        ProbeCommands::GpuBinding { out } => {
            let binding = gpu_binding::collect()?;
            let path = gpu_binding::write(&binding, out)?;
            info!("wrote {}", path.display());
        }
        ProbeCommands::JavaMemory => {
            // read by a `^True$` sanity pattern
            let matches = java_memory::check()?;
            println!("{}", if matches { "True" } else { "False" });
        }
    }
    Ok(0)
}
