//! Volume group reconciler
//!
//! Quotas are declared in GB with 0 meaning unlimited; the API stores KB and
//! reports an unlimited quota as an absent value. The provisioning type
//! (deduplication) is fixed at creation.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::resources::{synthetic_id, Kind};
use crate::sdp::{ObjectRef, SdpApi, VolumeGroupCreate, VolumeGroupUpdate, KB_PER_GB};

/// Capacity policy every volume group starts with unless the manifest says
/// otherwise, mirroring the array's built-in default profile
pub const DEFAULT_CAPACITY_POLICY: &str = "default_vg_capacity_policy";

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared volume group configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupSpec {
    pub name: String,
    /// 0 means unlimited
    #[serde(default)]
    pub quota_in_gb: u64,
    #[serde(default = "default_true")]
    pub enable_deduplication: bool,
    pub description: String,
    #[serde(default = "default_capacity_policy")]
    pub capacity_policy: String,
}

fn default_true() -> bool {
    true
}

fn default_capacity_policy() -> String {
    DEFAULT_CAPACITY_POLICY.to_string()
}

impl VolumeGroupSpec {
    #[cfg(test)]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            quota_in_gb: 0,
            enable_deduplication: true,
            description: "test volume group".into(),
            capacity_policy: default_capacity_policy(),
        }
    }
}

/// Recorded volume group state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub quota_in_gb: u64,
    pub enable_deduplication: bool,
    pub description: String,
    pub capacity_policy: String,
}

// =============================================================================
// Operations
// =============================================================================

struct Observed {
    obj_id: u64,
    name: String,
    quota_in_gb: u64,
    enable_deduplication: bool,
    description: String,
    capacity_policy: String,
}

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<Observed>> {
    let Some(group) = api.get_volume_group(name).await? else {
        return Ok(None);
    };

    // The API reports the policy as a ref; resolve it back to a name. A
    // dangling ref reads as no policy rather than an error.
    let capacity_policy = match group.capacity_policy.as_ref().and_then(ObjectRef::id) {
        Some(id) => api.capacity_policy_name(id).await?.unwrap_or_default(),
        None => String::new(),
    };

    Ok(Some(Observed {
        obj_id: group.id,
        name: group.name.clone(),
        quota_in_gb: group.quota_in_gb(),
        enable_deduplication: group.is_dedup,
        description: group.description.clone().unwrap_or_default(),
        capacity_policy,
    }))
}

fn record_from(observed: Observed, id: String) -> VolumeGroupRecord {
    VolumeGroupRecord {
        id,
        obj_id: observed.obj_id,
        name: observed.name,
        quota_in_gb: observed.quota_in_gb,
        enable_deduplication: observed.enable_deduplication,
        description: observed.description,
        capacity_policy: observed.capacity_policy,
    }
}

/// Resolve a declared capacity policy name to a reference; an empty name
/// means no policy
async fn resolve_policy(api: &dyn SdpApi, name: &str) -> Result<Option<ObjectRef>> {
    if name.is_empty() {
        return Ok(None);
    }
    let policy = api
        .get_capacity_policy(name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "capacity_policy".into(),
            name: name.into(),
        })?;
    Ok(Some(ObjectRef::new("vg_capacity_policies", policy.id)))
}

pub async fn create(api: &dyn SdpApi, spec: &VolumeGroupSpec) -> Result<VolumeGroupRecord> {
    info!("Creating volume group {}", spec.name);

    let capacity_policy = resolve_policy(api, &spec.capacity_policy).await?;
    let group = api
        .create_volume_group(&VolumeGroupCreate {
            name: spec.name.clone(),
            quota: match spec.quota_in_gb {
                0 => None,
                gb => Some(gb * KB_PER_GB),
            },
            is_dedup: spec.enable_deduplication,
            description: spec.description.clone(),
            capacity_policy,
        })
        .await?;

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "CreateVolumeGroup",
            format!("volume group {} vanished after creation", spec.name),
        )
    })?;
    Ok(record_from(observed, synthetic_id(Kind::VolumeGroup, group.id)))
}

pub async fn refresh(
    api: &dyn SdpApi,
    record: &VolumeGroupRecord,
) -> Result<Option<VolumeGroupRecord>> {
    Ok(observe(api, &record.name)
        .await?
        .map(|observed| record_from(observed, record.id.clone())))
}

pub async fn update(
    api: &dyn SdpApi,
    record: &VolumeGroupRecord,
    spec: &VolumeGroupSpec,
) -> Result<VolumeGroupRecord> {
    if spec.enable_deduplication != record.enable_deduplication {
        return Err(Error::Immutable {
            kind: "volume_group".into(),
            field: "enable_deduplication".into(),
        });
    }

    let current_name = record.name.as_str();

    let mut patch = VolumeGroupUpdate::default();
    if spec.name != record.name {
        patch.name = Some(spec.name.clone());
    }
    if spec.quota_in_gb != record.quota_in_gb {
        patch.quota = Some(match spec.quota_in_gb {
            0 => None,
            gb => Some(gb * KB_PER_GB),
        });
    }
    if spec.description != record.description {
        patch.description = Some(spec.description.clone());
    }
    if spec.capacity_policy != record.capacity_policy {
        patch.capacity_policy = resolve_policy(api, &spec.capacity_policy).await?;
    }

    if !patch.is_empty() {
        api.update_volume_group(current_name, &patch).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "UpdateVolumeGroup",
            format!("volume group {} vanished during update", spec.name),
        )
    })?;
    Ok(record_from(observed, record.id.clone()))
}

pub async fn delete(api: &dyn SdpApi, record: &VolumeGroupRecord) -> Result<()> {
    info!("Deleting volume group {}", record.name);
    api.delete_volume_group(&record.name).await
}

pub async fn import(api: &dyn SdpApi, name: &str) -> Result<VolumeGroupRecord> {
    let observed = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "volume_group".into(),
        name: name.into(),
    })?;
    let id = synthetic_id(Kind::VolumeGroup, observed.obj_id);
    Ok(record_from(observed, id))
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &VolumeGroupSpec, record: &VolumeGroupRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.quota_in_gb != record.quota_in_gb {
        changed.push("quota_in_gb".to_string());
    }
    if spec.enable_deduplication != record.enable_deduplication {
        changed.push("enable_deduplication".to_string());
    }
    if spec.description != record.description {
        changed.push("description".to_string());
    }
    if spec.capacity_policy != record.capacity_policy {
        changed.push("capacity_policy".to_string());
    }
    changed
}
