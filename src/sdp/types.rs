//! Typed payloads for the Silk SDP management API
//!
//! The SDP REST API wraps collection responses in a `hits` envelope and
//! cross-references objects through `{"ref": "/<collection>/<id>"}` values.
//! Sizes and quotas travel over the wire in KB; the manifest declares them in
//! GB and the conversion happens at this boundary.

use serde::{Deserialize, Serialize};

/// KB per GB, the unit conversion the SDP API expects for sizes and quotas
pub const KB_PER_GB: u64 = 1024 * 1024;

// =============================================================================
// Response Envelope
// =============================================================================

/// Collection response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Hits<T> {
    pub hits: Vec<T>,
}

/// Reference to another SDP object, e.g. `{"ref": "/volume_groups/3"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "ref")]
    pub path: String,
}

impl ObjectRef {
    /// Build a reference path for a collection and object id
    pub fn new(collection: &str, id: u64) -> Self {
        Self {
            path: format!("/{}/{}", collection, id),
        }
    }

    /// Extract the numeric object id from the reference path
    pub fn id(&self) -> Option<u64> {
        self.path.rsplit('/').next()?.parse().ok()
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub id: u64,
    pub name: String,
    /// Size in KB
    pub size: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub vmware_support: bool,
    #[serde(default)]
    pub scsi_sn: Option<String>,
    #[serde(default)]
    pub volume_group: Option<ObjectRef>,
}

impl Volume {
    pub fn size_in_gb(&self) -> u64 {
        self.size / KB_PER_GB
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeGroup {
    pub id: u64,
    pub name: String,
    /// Quota in KB; `None` means an unlimited quota
    #[serde(default)]
    pub quota: Option<u64>,
    #[serde(default)]
    pub is_dedup: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capacity_policy: Option<ObjectRef>,
}

impl VolumeGroup {
    /// Quota in GB, with 0 standing for unlimited
    pub fn quota_in_gb(&self) -> u64 {
        self.quota.map(|kb| kb / KB_PER_GB).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Host {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub host_type: String,
    #[serde(default)]
    pub host_group: Option<ObjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostGroup {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allow_different_host_types: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacityPolicy {
    pub id: u64,
    pub name: String,
    pub warning_threshold: u32,
    pub error_threshold: u32,
    pub critical_threshold: u32,
    pub full_threshold: u32,
    #[serde(default)]
    pub snapshot_overhead_threshold: Option<u32>,
}

/// Retention spans are string-typed on the wire, matching the SDP API
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionPolicy {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub num_snapshots: String,
    #[serde(default)]
    pub weeks: String,
    #[serde(default)]
    pub days: String,
    #[serde(default)]
    pub hours: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostPwwn {
    pub id: u64,
    pub pwwn: String,
    pub host: ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostIqn {
    pub id: u64,
    pub iqn: String,
    pub host: ObjectRef,
}

/// A volume-to-host or volume-to-host-group mapping
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    pub id: u64,
    pub volume: ObjectRef,
    pub host: Option<ObjectRef>,
    pub host_group: Option<ObjectRef>,
}

// =============================================================================
// Create Requests
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VolumeCreate {
    pub name: String,
    /// Size in KB
    pub size: u64,
    pub volume_group: ObjectRef,
    pub vmware_support: bool,
    pub description: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeGroupCreate {
    pub name: String,
    /// Quota in KB; omitted for an unlimited quota
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    pub is_dedup: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_policy: Option<ObjectRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub host_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostGroupCreate {
    pub name: String,
    pub description: String,
    pub allow_different_host_types: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityPolicyCreate {
    pub name: String,
    pub warning_threshold: u32,
    pub error_threshold: u32,
    pub critical_threshold: u32,
    /// The API pins this to 100 no matter what is sent; always send 100 so
    /// the recorded value matches the server
    pub full_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_overhead_threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionPolicyCreate {
    pub name: String,
    pub num_snapshots: String,
    pub weeks: String,
    pub days: String,
    pub hours: String,
}

// =============================================================================
// Update Patches
// =============================================================================

/// PATCH body for a volume; only populated fields are sent
#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group: Option<ObjectRef>,
}

impl VolumeUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.size.is_none()
            && self.description.is_none()
            && self.read_only.is_none()
            && self.volume_group.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeGroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_policy: Option<ObjectRef>,
}

impl VolumeGroupUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quota.is_none()
            && self.description.is_none()
            && self.capacity_policy.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub host_type: Option<String>,
}

impl HostUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.host_type.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HostGroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_different_host_types: Option<bool>,
}

impl HostGroupUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.allow_different_host_types.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionPolicyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_snapshots: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weeks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
}

impl RetentionPolicyUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.num_snapshots.is_none()
            && self.weeks.is_none()
            && self.days.is_none()
            && self.hours.is_none()
    }
}
