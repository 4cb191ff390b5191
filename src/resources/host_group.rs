//! Host group reconciler
//!
//! Host membership is a relation on the hosts themselves (a host carries at
//! most one group), reconciled here with `membership_diff`. Group names are
//! fixed at creation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::membership_diff;
use crate::error::{Error, Result};
use crate::resources::{sorted, synthetic_id, Kind};
use crate::sdp::{HostGroupCreate, HostGroupUpdate, SdpApi};

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared host group configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroupSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub allow_different_host_types: bool,
    #[serde(default)]
    pub host_mapping: Vec<String>,
}

/// Recorded host group state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroupRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub description: String,
    pub allow_different_host_types: bool,
    /// Lexicographically sorted
    pub host_mapping: Vec<String>,
}

// =============================================================================
// Operations
// =============================================================================

struct Observed {
    obj_id: u64,
    name: String,
    description: String,
    allow_different_host_types: bool,
    host_mapping: Vec<String>,
}

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<Observed>> {
    let Some(group) = api.get_host_group(name).await? else {
        return Ok(None);
    };

    let host_mapping = sorted(api.host_group_members(name).await?);

    Ok(Some(Observed {
        obj_id: group.id,
        name: group.name.clone(),
        description: group.description.clone().unwrap_or_default(),
        allow_different_host_types: group.allow_different_host_types,
        host_mapping,
    }))
}

fn record_from(observed: Observed, id: String) -> HostGroupRecord {
    HostGroupRecord {
        id,
        obj_id: observed.obj_id,
        name: observed.name,
        description: observed.description,
        allow_different_host_types: observed.allow_different_host_types,
        host_mapping: observed.host_mapping,
    }
}

/// Create the host group and attach its declared member hosts
pub async fn create(api: &dyn SdpApi, spec: &HostGroupSpec) -> Result<HostGroupRecord> {
    info!("Creating host group {}", spec.name);

    let group = api
        .create_host_group(&HostGroupCreate {
            name: spec.name.clone(),
            description: spec.description.clone(),
            allow_different_host_types: spec.allow_different_host_types,
        })
        .await?;

    for host in &spec.host_mapping {
        api.add_host_to_group(host, &spec.name).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "CreateHostGroup",
            format!("host group {} vanished after creation", spec.name),
        )
    })?;
    Ok(record_from(observed, synthetic_id(Kind::HostGroup, group.id)))
}

pub async fn refresh(
    api: &dyn SdpApi,
    record: &HostGroupRecord,
) -> Result<Option<HostGroupRecord>> {
    Ok(observe(api, &record.name)
        .await?
        .map(|observed| record_from(observed, record.id.clone())))
}

pub async fn update(
    api: &dyn SdpApi,
    record: &HostGroupRecord,
    spec: &HostGroupSpec,
) -> Result<HostGroupRecord> {
    if spec.name != record.name {
        return Err(Error::Immutable {
            kind: "host_group".into(),
            field: "name".into(),
        });
    }

    let diff = membership_diff(&record.host_mapping, &spec.host_mapping);
    if !diff.is_empty() {
        debug!(
            "Host group {}: {} member removal(s), {} addition(s)",
            record.name,
            diff.to_remove.len(),
            diff.to_add.len()
        );
    }
    for host in &diff.to_remove {
        api.remove_host_from_group(host, &record.name).await?;
    }
    for host in &diff.to_add {
        api.add_host_to_group(host, &record.name).await?;
    }

    let mut patch = HostGroupUpdate::default();
    if spec.description != record.description {
        patch.description = Some(spec.description.clone());
    }
    if spec.allow_different_host_types != record.allow_different_host_types {
        patch.allow_different_host_types = Some(spec.allow_different_host_types);
    }
    if !patch.is_empty() {
        api.update_host_group(&record.name, &patch).await?;
    }

    let observed = observe(api, &record.name).await?.ok_or_else(|| {
        Error::api(
            "UpdateHostGroup",
            format!("host group {} vanished during update", record.name),
        )
    })?;
    Ok(record_from(observed, record.id.clone()))
}

pub async fn delete(api: &dyn SdpApi, record: &HostGroupRecord) -> Result<()> {
    info!("Deleting host group {}", record.name);
    api.delete_host_group(&record.name).await
}

pub async fn import(api: &dyn SdpApi, name: &str) -> Result<HostGroupRecord> {
    let observed = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "host_group".into(),
        name: name.into(),
    })?;
    let id = synthetic_id(Kind::HostGroup, observed.obj_id);
    Ok(record_from(observed, id))
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &HostGroupSpec, record: &HostGroupRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.description != record.description {
        changed.push("description".to_string());
    }
    if spec.allow_different_host_types != record.allow_different_host_types {
        changed.push("allow_different_host_types".to_string());
    }
    if !membership_diff(&record.host_mapping, &spec.host_mapping).is_empty() {
        changed.push("host_mapping".to_string());
    }
    changed
}
