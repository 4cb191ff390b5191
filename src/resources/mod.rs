//! Per-resource reconcilers
//!
//! One module per declared resource kind. Each maps a typed spec from the
//! manifest onto SDP API calls and produces the record the state file
//! persists. Relation lists (PWWNs, host mappings) are reconciled through
//! [`crate::diff::membership_diff`]: recorded membership is the current side,
//! declared membership the desired side, and detaches run before attaches so
//! a partially applied update never leaves a member doubly attached.

pub mod capacity_policy;
pub mod host;
pub mod host_group;
pub mod retention_policy;
pub mod volume;
pub mod volume_group;

use serde::{Deserialize, Serialize};

/// Resource kinds, in the order reconciliation creates them.
///
/// Deletion walks the same order in reverse so referents outlive their
/// referrers (volumes before volume groups, host groups before hosts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    CapacityPolicy,
    RetentionPolicy,
    VolumeGroup,
    Host,
    HostGroup,
    Volume,
}

impl Kind {
    /// All kinds in creation order
    pub const ORDERED: [Kind; 6] = [
        Kind::CapacityPolicy,
        Kind::RetentionPolicy,
        Kind::VolumeGroup,
        Kind::Host,
        Kind::HostGroup,
        Kind::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::CapacityPolicy => "capacity_policy",
            Kind::RetentionPolicy => "retention_policy",
            Kind::VolumeGroup => "volume_group",
            Kind::Host => "host",
            Kind::HostGroup => "host_group",
            Kind::Volume => "volume",
        }
    }

    /// State-file key for a resource of this kind
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.as_str(), name)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic resource identifier: object id plus creation timestamp,
/// e.g. `silk-volume-7-1706224531`
pub fn synthetic_id(kind: Kind, obj_id: u64) -> String {
    format!(
        "silk-{}-{}-{}",
        kind.as_str(),
        obj_id,
        chrono::Utc::now().timestamp()
    )
}

/// Sort a relation list lexicographically before it is recorded, so the next
/// plan does not see a spurious ordering change
pub(crate) fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}
