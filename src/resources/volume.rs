//! Volume reconciler
//!
//! A volume lives inside a volume group and can be mapped to hosts and host
//! groups. Both mapping lists are reconciled with `membership_diff`. The
//! `allow_destroy` flag is reconciler-side only: it guards `delete` and is
//! never sent to the server.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::membership_diff;
use crate::error::{Error, Result};
use crate::resources::{sorted, synthetic_id, Kind};
use crate::sdp::{ObjectRef, SdpApi, VolumeCreate, VolumeUpdate, KB_PER_GB};

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared volume configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub size_in_gb: u64,
    pub volume_group_name: String,
    pub description: String,
    #[serde(default)]
    pub vmware: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub allow_destroy: bool,
    #[serde(default)]
    pub host_mapping: Vec<String>,
    #[serde(default)]
    pub host_group_mapping: Vec<String>,
}

/// Recorded volume state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub size_in_gb: u64,
    pub volume_group_id: u64,
    pub volume_group_name: String,
    pub description: String,
    pub vmware: bool,
    pub read_only: bool,
    pub allow_destroy: bool,
    pub scsi_sn: Option<String>,
    /// Lexicographically sorted
    pub host_mapping: Vec<String>,
    /// Lexicographically sorted
    pub host_group_mapping: Vec<String>,
}

// =============================================================================
// Operations
// =============================================================================

struct Observed {
    obj_id: u64,
    name: String,
    size_in_gb: u64,
    volume_group_id: u64,
    volume_group_name: String,
    description: String,
    vmware: bool,
    read_only: bool,
    scsi_sn: Option<String>,
    host_mapping: Vec<String>,
    host_group_mapping: Vec<String>,
}

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<Observed>> {
    let Some(volume) = api.get_volume(name).await? else {
        return Ok(None);
    };

    // The API reports the volume group as a ref; resolve it back to a name
    let volume_group_id = volume
        .volume_group
        .as_ref()
        .and_then(ObjectRef::id)
        .unwrap_or(0);
    let volume_group_name = match volume_group_id {
        0 => String::new(),
        id => api
            .get_volume_groups()
            .await?
            .into_iter()
            .find(|vg| vg.id == id)
            .map(|vg| vg.name)
            .unwrap_or_default(),
    };

    let host_mapping = sorted(api.volume_host_mappings(name).await?);
    let host_group_mapping = sorted(api.volume_host_group_mappings(name).await?);

    Ok(Some(Observed {
        obj_id: volume.id,
        name: volume.name.clone(),
        size_in_gb: volume.size_in_gb(),
        volume_group_id,
        volume_group_name,
        description: volume.description.clone().unwrap_or_default(),
        vmware: volume.vmware_support,
        read_only: volume.read_only,
        scsi_sn: volume.scsi_sn,
        host_mapping,
        host_group_mapping,
    }))
}

fn record_from(observed: Observed, id: String, allow_destroy: bool) -> VolumeRecord {
    VolumeRecord {
        id,
        obj_id: observed.obj_id,
        name: observed.name,
        size_in_gb: observed.size_in_gb,
        volume_group_id: observed.volume_group_id,
        volume_group_name: observed.volume_group_name,
        description: observed.description,
        vmware: observed.vmware,
        read_only: observed.read_only,
        allow_destroy,
        scsi_sn: observed.scsi_sn,
        host_mapping: observed.host_mapping,
        host_group_mapping: observed.host_group_mapping,
    }
}

/// Create the volume inside its volume group and attach initial mappings
pub async fn create(api: &dyn SdpApi, spec: &VolumeSpec) -> Result<VolumeRecord> {
    info!("Creating volume {} ({} GB)", spec.name, spec.size_in_gb);

    let group = api
        .get_volume_group(&spec.volume_group_name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "volume_group".into(),
            name: spec.volume_group_name.clone(),
        })?;

    let volume = api
        .create_volume(&VolumeCreate {
            name: spec.name.clone(),
            size: spec.size_in_gb * KB_PER_GB,
            volume_group: ObjectRef::new("volume_groups", group.id),
            vmware_support: spec.vmware,
            description: spec.description.clone(),
            read_only: spec.read_only,
        })
        .await?;

    for host in &spec.host_mapping {
        api.map_host_to_volume(host, &spec.name).await?;
    }
    for group in &spec.host_group_mapping {
        api.map_host_group_to_volume(group, &spec.name).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "CreateVolume",
            format!("volume {} vanished after creation", spec.name),
        )
    })?;
    Ok(record_from(
        observed,
        synthetic_id(Kind::Volume, volume.id),
        spec.allow_destroy,
    ))
}

/// Re-read the live volume, keeping the recorded synthetic id
pub async fn refresh(api: &dyn SdpApi, record: &VolumeRecord) -> Result<Option<VolumeRecord>> {
    Ok(observe(api, &record.name)
        .await?
        .map(|observed| record_from(observed, record.id.clone(), record.allow_destroy)))
}

/// Converge the live volume from its recorded state to the declared spec
pub async fn update(
    api: &dyn SdpApi,
    record: &VolumeRecord,
    spec: &VolumeSpec,
) -> Result<VolumeRecord> {
    if spec.vmware != record.vmware {
        return Err(Error::Immutable {
            kind: "volume".into(),
            field: "vmware".into(),
        });
    }

    let current_name = record.name.as_str();

    // Host mappings: recorded membership vs declared membership
    let host_diff = membership_diff(&record.host_mapping, &spec.host_mapping);
    if !host_diff.is_empty() {
        debug!(
            "Volume {}: {} host unmap(s), {} map(s)",
            current_name,
            host_diff.to_remove.len(),
            host_diff.to_add.len()
        );
    }
    for host in &host_diff.to_remove {
        api.unmap_host_from_volume(host, current_name).await?;
    }
    for host in &host_diff.to_add {
        api.map_host_to_volume(host, current_name).await?;
    }

    // Host group mappings
    let group_diff = membership_diff(&record.host_group_mapping, &spec.host_group_mapping);
    for group in &group_diff.to_remove {
        api.unmap_host_group_from_volume(group, current_name).await?;
    }
    for group in &group_diff.to_add {
        api.map_host_group_to_volume(group, current_name).await?;
    }

    let mut patch = VolumeUpdate::default();
    if spec.name != record.name {
        patch.name = Some(spec.name.clone());
    }
    if spec.size_in_gb != record.size_in_gb {
        patch.size = Some(spec.size_in_gb * KB_PER_GB);
    }
    if spec.description != record.description {
        patch.description = Some(spec.description.clone());
    }
    if spec.read_only != record.read_only {
        patch.read_only = Some(spec.read_only);
    }
    if spec.volume_group_name != record.volume_group_name {
        let group = api
            .get_volume_group(&spec.volume_group_name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "volume_group".into(),
                name: spec.volume_group_name.clone(),
            })?;
        if group.id != record.volume_group_id {
            patch.volume_group = Some(ObjectRef::new("volume_groups", group.id));
        }
    }
    if !patch.is_empty() {
        api.update_volume(current_name, &patch).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "UpdateVolume",
            format!("volume {} vanished during update", spec.name),
        )
    })?;
    Ok(record_from(observed, record.id.clone(), spec.allow_destroy))
}

/// Unmap everything, then delete. Refuses when `allow_destroy` is false.
pub async fn delete(api: &dyn SdpApi, record: &VolumeRecord) -> Result<()> {
    if !record.allow_destroy {
        return Err(Error::DestroyProtected {
            name: record.name.clone(),
        });
    }

    info!("Deleting volume {}", record.name);

    for host in &record.host_mapping {
        api.unmap_host_from_volume(host, &record.name).await?;
    }
    for group in &record.host_group_mapping {
        api.unmap_host_group_from_volume(group, &record.name).await?;
    }

    api.delete_volume(&record.name).await
}

/// Rebuild a record from the live volume, assigning a fresh synthetic id.
///
/// An imported volume gets `allow_destroy = false`; destroying it requires an
/// explicit opt-in through the manifest first.
pub async fn import(api: &dyn SdpApi, name: &str) -> Result<VolumeRecord> {
    let observed = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "volume".into(),
        name: name.into(),
    })?;
    let id = synthetic_id(Kind::Volume, observed.obj_id);
    Ok(record_from(observed, id, false))
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &VolumeSpec, record: &VolumeRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.size_in_gb != record.size_in_gb {
        changed.push("size_in_gb".to_string());
    }
    if spec.volume_group_name != record.volume_group_name {
        changed.push("volume_group_name".to_string());
    }
    if spec.description != record.description {
        changed.push("description".to_string());
    }
    if spec.vmware != record.vmware {
        changed.push("vmware".to_string());
    }
    if spec.read_only != record.read_only {
        changed.push("read_only".to_string());
    }
    if !membership_diff(&record.host_mapping, &spec.host_mapping).is_empty() {
        changed.push("host_mapping".to_string());
    }
    if !membership_diff(&record.host_group_mapping, &spec.host_group_mapping).is_empty() {
        changed.push("host_group_mapping".to_string());
    }
    changed
}
