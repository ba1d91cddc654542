use super::builtin::builtin_site;
use super::types::{Environment, General, PartitionPolicy, SiteConfig, System};
use crate::error::{RegtestError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Partial site description read from YAML; every section is optional
#[derive(Debug, Default, Deserialize)]
pub struct SiteOverlay {
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub policies: BTreeMap<String, PartitionPolicy>,
    pub general: Option<General>,
}

/// `$XDG_CONFIG_HOME/hpc-regtest/site.yaml`
pub fn default_overlay_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hpc-regtest").join("site.yaml"))
}

pub fn read_overlay(path: &Path) -> Result<SiteOverlay> {
    let text = fs::read_to_string(path).map_err(|e| RegtestError::io(path, e))?;
    serde_yaml::from_str(&text)
        .map_err(|e| RegtestError::Config(format!("{}: {}", path.display(), e)))
}

impl SiteConfig {
    /// Replace same-named entries, append new ones
    pub fn merge(&mut self, overlay: SiteOverlay) {
        for system in overlay.systems {
            match self.systems.iter_mut().find(|s| s.name == system.name) {
                Some(existing) => *existing = system,
                None => self.systems.push(system),
            }
        }
        for env in overlay.environments {
            match self.environments.iter_mut().find(|e| e.name == env.name) {
                Some(existing) => *existing = env,
                None => self.environments.push(env),
            }
        }
        self.policies.extend(overlay.policies);
        if let Some(general) = overlay.general {
            self.general = general;
        }
    }
}

/// Built-in tables, overlaid with the explicit file or else the default one
pub fn load_site(explicit: Option<&Path>) -> Result<SiteConfig> {
    let mut site = builtin_site();

    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_overlay_path().filter(|p| p.is_file()),
    };

    match path {
        Some(path) => {
            info!("loading site overlay from {}", path.display());
            site.merge(read_overlay(&path)?);
        }
        None => debug!("no site overlay, using built-in tables"),
    }

    site.validate()?;
    Ok(site)
}

impl SiteConfig {
    fn validate(&self) -> Result<()> {
        for system in &self.systems {
            for pattern in &system.hostnames {
                regex::Regex::new(pattern).map_err(|e| {
                    RegtestError::Config(format!(
                        "system {}: bad hostname pattern '{}': {}",
                        system.name, pattern, e
                    ))
                })?;
            }
            for partition in &system.partitions {
                for environ in &partition.environs {
                    if !self.environments.iter().any(|e| &e.name == environ) {
                        return Err(RegtestError::Config(format!(
                            "partition {}:{} refers to unknown environment {}",
                            system.name, partition.name, environ
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERLAY: &str = r#"
systems:
  - name: hydra
    descr: Hydra test bed
    hostnames: ['.*hydra.*']
    modules_system: lmod
    partitions:
      - name: zen4-sn
        scheduler: slurm
        access: ['--partition=zen4']
        environs: [builtin, foss-2021a]
        descr: single-node jobs in Zen4 nodes
        max_jobs: 4
        launcher: local
  - name: anansi
    descr: Anansi
    hostnames: ['.*anansi.*']
    modules_system: lmod
    partitions: []
general:
  check_search_path: ['checks/']
  check_search_recursive: true
  purge_environment: true
  resolve_module_conflicts: false
  keep_stage_files: false
  max_cores_per_node: 128
"#;

    #[test]
    fn test_overlay_replaces_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yaml");
        fs::write(&path, OVERLAY).unwrap();

        let site = load_site(Some(&path)).unwrap();
        let hydra = site.find_system("hydra").unwrap();
        assert_eq!(hydra.descr, "Hydra test bed");
        assert_eq!(hydra.partitions.len(), 1);
        assert!(site.find_system("anansi").is_ok());
        assert!(site.find_system("chimera").is_ok());
        assert_eq!(site.general.max_cores_per_node, 128);
    }

    #[test]
    fn test_overlay_with_unknown_environ_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yaml");
        fs::write(&path, OVERLAY.replace("foss-2021a", "foss-1999z")).unwrap();

        let err = load_site(Some(&path)).unwrap_err();
        assert!(matches!(err, RegtestError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_overlay_is_an_error() {
        let err = load_site(Some(Path::new("/nonexistent/site.yaml"))).unwrap_err();
        assert!(matches!(err, RegtestError::Io { .. }));
    }
}
