use crate::cli::SiteCommands;
use crate::error::{RegtestError, Result};
use crate::output::output_data;
use crate::site::SiteConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SystemSummary<'a> {
    name: &'a str,
    descr: &'a str,
    hostnames: &'a [String],
    partitions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Detection<'a> {
    hostname: String,
    system: &'a str,
}

pub fn handle_site_command(cmd: &SiteCommands, site: &SiteConfig) -> Result<i32> {
    match cmd {
        SiteCommands::Systems { format } => {
            let systems: Vec<SystemSummary> = site
                .systems
                .iter()
                .map(|s| SystemSummary {
                    name: &s.name,
                    descr: &s.descr,
                    hostnames: &s.hostnames,
                    partitions: s.qualified_partitions(),
                })
                .collect();
            output_data(&systems, format)?;
        }
        SiteCommands::Partitions { system, format } => {
            output_data(&site.find_system(system)?.partitions, format)?;
        }
        SiteCommands::Environs { format } => {
            output_data(&site.environments, format)?;
        }
        SiteCommands::Detect { hostname, format } => {
            let hostname = match hostname {
                Some(name) => name.clone(),
                None => sysinfo::System::host_name().ok_or_else(|| {
                    RegtestError::Probe("cannot determine hostname".to_string())
                })?,
            };
            let system = site
                .detect_system(&hostname)
                .ok_or_else(|| RegtestError::UnknownSystem(format!("for host {}", hostname)))?;
            output_data(
                &Detection {
                    system: &system.name,
                    hostname,
                },
                format,
            )?;
        }
    }
    Ok(0)
}
