//! Declared configuration manifest
//!
//! The manifest is a YAML document listing every resource the reconciler
//! should manage, one list per kind. It is the "desired" side of every diff.
//! Validation runs before any API call so a malformed manifest never gets a
//! partial apply.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resources::capacity_policy::CapacityPolicySpec;
use crate::resources::host::HostSpec;
use crate::resources::host_group::HostGroupSpec;
use crate::resources::retention_policy::RetentionPolicySpec;
use crate::resources::volume::VolumeSpec;
use crate::resources::volume_group::VolumeGroupSpec;

/// Declared resources, one list per kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub capacity_policies: Vec<CapacityPolicySpec>,
    #[serde(default)]
    pub retention_policies: Vec<RetentionPolicySpec>,
    #[serde(default)]
    pub volume_groups: Vec<VolumeGroupSpec>,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
    #[serde(default)]
    pub host_groups: Vec<HostGroupSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

impl Manifest {
    /// Load and validate a manifest from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_yaml::from_str(&data)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural validation of the declared resources
    pub fn validate(&self) -> Result<()> {
        check_names("capacity_policies", self.capacity_policies.iter().map(|s| &s.name))?;
        check_names("retention_policies", self.retention_policies.iter().map(|s| &s.name))?;
        check_names("volume_groups", self.volume_groups.iter().map(|s| &s.name))?;
        check_names("hosts", self.hosts.iter().map(|s| &s.name))?;
        check_names("host_groups", self.host_groups.iter().map(|s| &s.name))?;
        check_names("volumes", self.volumes.iter().map(|s| &s.name))?;

        for policy in &self.capacity_policies {
            if !(policy.warning_threshold < policy.error_threshold
                && policy.error_threshold < policy.critical_threshold)
            {
                return Err(Error::Validation(format!(
                    "capacity policy {}: thresholds must increase from warning to critical",
                    policy.name
                )));
            }
            if policy.critical_threshold > 100 {
                return Err(Error::Validation(format!(
                    "capacity policy {}: critical_threshold exceeds 100 percent",
                    policy.name
                )));
            }
        }

        for host in &self.hosts {
            if host.host_type.is_empty() {
                return Err(Error::Validation(format!(
                    "host {}: host_type must be set",
                    host.name
                )));
            }
        }

        // A volume may reference a group that lives on the array without
        // being declared here; the server rejects a truly missing group.
        for volume in &self.volumes {
            if volume.size_in_gb == 0 {
                return Err(Error::Validation(format!(
                    "volume {}: size_in_gb must be greater than zero",
                    volume.name
                )));
            }
            if volume.volume_group_name.is_empty() {
                return Err(Error::Validation(format!(
                    "volume {}: volume_group_name must be set",
                    volume.name
                )));
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.capacity_policies.is_empty()
            && self.retention_policies.is_empty()
            && self.volume_groups.is_empty()
            && self.hosts.is_empty()
            && self.host_groups.is_empty()
            && self.volumes.is_empty()
    }
}

fn check_names<'a>(section: &str, names: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::Validation(format!(
                "{}: resource name must not be empty",
                section
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::Validation(format!(
                "{}: duplicate resource name {}",
                section, name
            )));
        }
    }
    Ok(())
}
