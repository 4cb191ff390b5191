//! Snapshot retention policy reconciler
//!
//! Retention spans travel as strings on the wire (the SDP API is
//! string-typed here); the spec mirrors that rather than inventing units.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::resources::{synthetic_id, Kind};
use crate::sdp::{RetentionPolicyCreate, RetentionPolicyUpdate, SdpApi};

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared retention policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicySpec {
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

/// Recorded retention policy state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicyRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub num_snapshots: String,
    pub weeks: String,
    pub days: String,
    pub hours: String,
}

// =============================================================================
// Operations
// =============================================================================

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<RetentionPolicyRecord>> {
    let Some(policy) = api.get_retention_policy(name).await? else {
        return Ok(None);
    };
    Ok(Some(RetentionPolicyRecord {
        id: String::new(),
        obj_id: policy.id,
        name: policy.name,
        num_snapshots: policy.num_snapshots,
        weeks: policy.weeks,
        days: policy.days,
        hours: policy.hours,
    }))
}

pub async fn create(api: &dyn SdpApi, spec: &RetentionPolicySpec) -> Result<RetentionPolicyRecord> {
    info!("Creating retention policy {}", spec.name);

    let policy = api
        .create_retention_policy(&RetentionPolicyCreate {
            name: spec.name.clone(),
            num_snapshots: spec.num_snapshots.clone(),
            weeks: spec.weeks.clone(),
            days: spec.days.clone(),
            hours: spec.hours.clone(),
        })
        .await?;

    let mut record = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "CreateRetentionPolicy",
            format!("retention policy {} vanished after creation", spec.name),
        )
    })?;
    record.id = synthetic_id(Kind::RetentionPolicy, policy.id);
    Ok(record)
}

pub async fn refresh(
    api: &dyn SdpApi,
    record: &RetentionPolicyRecord,
) -> Result<Option<RetentionPolicyRecord>> {
    Ok(observe(api, &record.name).await?.map(|mut observed| {
        observed.id = record.id.clone();
        observed
    }))
}

pub async fn update(
    api: &dyn SdpApi,
    record: &RetentionPolicyRecord,
    spec: &RetentionPolicySpec,
) -> Result<RetentionPolicyRecord> {
    let current_name = record.name.as_str();

    let mut patch = RetentionPolicyUpdate::default();
    if spec.name != record.name {
        patch.name = Some(spec.name.clone());
    }
    if spec.num_snapshots != record.num_snapshots {
        patch.num_snapshots = Some(spec.num_snapshots.clone());
    }
    if spec.weeks != record.weeks {
        patch.weeks = Some(spec.weeks.clone());
    }
    if spec.days != record.days {
        patch.days = Some(spec.days.clone());
    }
    if spec.hours != record.hours {
        patch.hours = Some(spec.hours.clone());
    }
    if !patch.is_empty() {
        api.update_retention_policy(current_name, &patch).await?;
    }

    let mut updated = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "UpdateRetentionPolicy",
            format!("retention policy {} vanished during update", spec.name),
        )
    })?;
    updated.id = record.id.clone();
    Ok(updated)
}

pub async fn delete(api: &dyn SdpApi, record: &RetentionPolicyRecord) -> Result<()> {
    info!("Deleting retention policy {}", record.name);
    api.delete_retention_policy(&record.name).await
}

pub async fn import(api: &dyn SdpApi, name: &str) -> Result<RetentionPolicyRecord> {
    let mut record = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "retention_policy".into(),
        name: name.into(),
    })?;
    record.id = synthetic_id(Kind::RetentionPolicy, record.obj_id);
    Ok(record)
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &RetentionPolicySpec, record: &RetentionPolicyRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.num_snapshots != record.num_snapshots {
        changed.push("num_snapshots".to_string());
    }
    if spec.weeks != record.weeks {
        changed.push("weeks".to_string());
    }
    if spec.days != record.days {
        changed.push("days".to_string());
    }
    if spec.hours != record.hours {
        changed.push("hours".to_string());
    }
    changed
}
