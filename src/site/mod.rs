// Site configuration: systems, partitions, programming environments
pub mod builtin;
pub mod loader;
pub mod perflog;
pub mod types;

pub use builtin::builtin_site;
pub use loader::load_site;
pub use perflog::PerfLogRecord;
pub use types::{Environment, General, Partition, PartitionPolicy, SiteConfig, System};

use crate::error::{RegtestError, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Account whose perf logs also go to syslog at info level
pub const SERVICE_ACCOUNT: &str = "vsc10001";

impl SiteConfig {
    pub fn find_system(&self, name: &str) -> Result<&System> {
        self.systems
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| RegtestError::UnknownSystem(name.to_string()))
    }

    /// First system with a hostname pattern matching `hostname`
    pub fn detect_system(&self, hostname: &str) -> Option<&System> {
        self.systems.iter().find(|system| {
            system.hostnames.iter().any(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern))
                    .map(|re| re.is_match(hostname))
                    .unwrap_or(false)
            })
        })
    }

    pub fn find_environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Partition routing policy of the scheduler on `system`
    pub fn policy(&self, system: &str) -> Result<&PartitionPolicy> {
        self.policies
            .get(system)
            .ok_or_else(|| RegtestError::Config(format!("no partition policy for system {}", system)))
    }
}

impl System {
    pub fn partition(&self, name: &str) -> Result<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| RegtestError::UnknownPartition {
                system: self.name.clone(),
                partition: name.to_string(),
            })
    }

    /// `system:partition` names of every partition
    pub fn qualified_partitions(&self) -> Vec<String> {
        self.partitions
            .iter()
            .map(|p| format!("{}:{}", self.name, p.name))
            .collect()
    }
}

impl Partition {
    /// Scheduler options of resource `name` with `{var}` placeholders filled in.
    ///
    /// Options that still carry an unresolved placeholder are dropped.
    pub fn resource_options(&self, name: &str, vars: &BTreeMap<String, String>) -> Vec<String> {
        let Some(resource) = self.resources.iter().find(|r| r.name == name) else {
            return Vec::new();
        };
        resource
            .options
            .iter()
            .filter_map(|template| {
                let rendered = vars.iter().fold(template.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                });
                (!rendered.contains('{')).then_some(rendered)
            })
            .collect()
    }
}

/// Level at which perf records go to syslog for the given user
pub fn syslog_level(user: &str) -> &'static str {
    if user == SERVICE_ACCOUNT {
        "info"
    } else {
        "warning"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_system() {
        let site = builtin_site();
        assert_eq!(site.find_system("chimera").unwrap().name, "chimera");
        assert!(matches!(
            site.find_system("vega"),
            Err(RegtestError::UnknownSystem(_))
        ));
    }

    #[test]
    fn test_detect_system_first_match_wins() {
        let site = builtin_site();
        // the cerberus login nodes are listed for hydra first
        assert_eq!(site.detect_system("login1.cerberus.os").unwrap().name, "hydra");
        assert_eq!(site.detect_system("node301.hydra.os").unwrap().name, "hydra");
        assert_eq!(site.detect_system("mgmt.manticore").unwrap().name, "manticore");
        assert!(site.detect_system("laptop").is_none());
    }

    #[test]
    fn test_partition_lookup() {
        let site = builtin_site();
        let hydra = site.find_system("hydra").unwrap();
        assert_eq!(hydra.partition("skylake-sn").unwrap().max_jobs, 10);
        assert!(matches!(
            hydra.partition("zen4-sn"),
            Err(RegtestError::UnknownPartition { .. })
        ));
        assert!(hydra
            .qualified_partitions()
            .contains(&"hydra:zen2-ampere-sn-gpu".to_string()));
    }

    #[test]
    fn test_resource_options() {
        let site = builtin_site();
        let gpu = site
            .find_system("hydra")
            .unwrap()
            .partition("broadwell-pascal-sn-gpu")
            .unwrap();

        let mut vars = BTreeMap::new();
        vars.insert("num_gpus_per_node".to_string(), "2".to_string());
        assert_eq!(gpu.resource_options("gpu", &vars), vec!["--gres=gpu:2"]);
        assert!(gpu.resource_options("gpu", &BTreeMap::new()).is_empty());
        assert!(gpu.resource_options("memory", &vars).is_empty());
    }

    #[test]
    fn test_policy() {
        let site = builtin_site();
        assert_eq!(site.policy("hydra").unwrap().gpu[0], ("ampere_gpu".to_string(), 16));
        assert!(site.policy("local").is_err());
    }

    #[test]
    fn test_syslog_level() {
        assert_eq!(syslog_level("vsc10001"), "info");
        assert_eq!(syslog_level("vsc10002"), "warning");
    }
}
