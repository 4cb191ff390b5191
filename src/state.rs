//! Recorded reconciliation state
//!
//! The state file is a JSON snapshot of every resource the reconciler
//! manages, keyed by `kind/name`. It is the "current" side of every diff:
//! plan compares the manifest against it after refreshing each record from
//! the array, and apply rewrites it as resources change. Writes go through a
//! temporary file in the same directory so a crash never leaves a truncated
//! state behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::resources::capacity_policy::CapacityPolicyRecord;
use crate::resources::host::HostRecord;
use crate::resources::host_group::HostGroupRecord;
use crate::resources::retention_policy::RetentionPolicyRecord;
use crate::resources::volume::VolumeRecord;
use crate::resources::volume_group::VolumeGroupRecord;
use crate::resources::Kind;

// =============================================================================
// Records
// =============================================================================

/// A recorded resource, tagged by kind in the state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    CapacityPolicy(CapacityPolicyRecord),
    RetentionPolicy(RetentionPolicyRecord),
    VolumeGroup(VolumeGroupRecord),
    Host(HostRecord),
    HostGroup(HostGroupRecord),
    Volume(VolumeRecord),
}

impl Record {
    pub fn kind(&self) -> Kind {
        match self {
            Record::CapacityPolicy(_) => Kind::CapacityPolicy,
            Record::RetentionPolicy(_) => Kind::RetentionPolicy,
            Record::VolumeGroup(_) => Kind::VolumeGroup,
            Record::Host(_) => Kind::Host,
            Record::HostGroup(_) => Kind::HostGroup,
            Record::Volume(_) => Kind::Volume,
        }
    }

    /// Live name of the recorded resource
    pub fn name(&self) -> &str {
        match self {
            Record::CapacityPolicy(r) => &r.name,
            Record::RetentionPolicy(r) => &r.name,
            Record::VolumeGroup(r) => &r.name,
            Record::Host(r) => &r.name,
            Record::HostGroup(r) => &r.name,
            Record::Volume(r) => &r.name,
        }
    }

    /// Synthetic identifier assigned at creation or import
    pub fn id(&self) -> &str {
        match self {
            Record::CapacityPolicy(r) => &r.id,
            Record::RetentionPolicy(r) => &r.id,
            Record::VolumeGroup(r) => &r.id,
            Record::Host(r) => &r.id,
            Record::HostGroup(r) => &r.id,
            Record::Volume(r) => &r.id,
        }
    }
}

// =============================================================================
// State File
// =============================================================================

/// On-disk reconciliation state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Incremented on every save
    #[serde(default)]
    pub serial: u64,
    /// Records keyed by `kind/name`
    #[serde(default)]
    pub resources: BTreeMap<String, Record>,
}

impl State {
    /// Load state from `path`; a missing file reads as empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("State file {} does not exist, starting empty", path.display());
            return Ok(State::default());
        }
        let data = std::fs::read_to_string(path)?;
        let state = serde_json::from_str(&data)?;
        Ok(state)
    }

    /// Persist state to `path`, bumping the serial.
    ///
    /// Written via a temporary file in the target directory and renamed into
    /// place, so readers never observe a partial write.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.serial += 1;
        let data = serde_json::to_string_pretty(self)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(
            "Saved state serial {} ({} records) to {}",
            self.serial,
            self.resources.len(),
            path.display()
        );
        Ok(())
    }

    pub fn get(&self, kind: Kind, declared_name: &str) -> Option<&Record> {
        self.resources.get(&kind.key(declared_name))
    }

    pub fn insert(&mut self, declared_name: &str, record: Record) {
        self.resources
            .insert(record.kind().key(declared_name), record);
    }

    pub fn remove(&mut self, kind: Kind, declared_name: &str) -> Option<Record> {
        self.resources.remove(&kind.key(declared_name))
    }

    /// Declared names of all records of one kind, in key order
    pub fn names_of(&self, kind: Kind) -> Vec<String> {
        let prefix = format!("{}/", kind.as_str());
        self.resources
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
