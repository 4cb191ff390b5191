//! Capacity policy reconciler
//!
//! Threshold profiles for volume group capacity alerts. The SDP endpoint has
//! no PATCH method and pins `full_threshold` to 100, so the policy is
//! immutable once created: drift is reported as an error and the operator
//! replaces the policy by removing and re-declaring it.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::resources::{synthetic_id, Kind};
use crate::sdp::{CapacityPolicyCreate, SdpApi};

/// Value the API forces `full_threshold` to regardless of the request
pub const PINNED_FULL_THRESHOLD: u32 = 100;

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared capacity policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicySpec {
    pub name: String,
    /// Percent used capacity that triggers a warning
    pub warning_threshold: u32,
    /// Percent used capacity that triggers an error
    pub error_threshold: u32,
    /// Percent used capacity that triggers a critical alert
    pub critical_threshold: u32,
    /// Percent capacity used by snapshots that triggers an alert
    #[serde(default)]
    pub snapshot_overhead_threshold: Option<u32>,
}

/// Recorded capacity policy state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicyRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub warning_threshold: u32,
    pub error_threshold: u32,
    pub critical_threshold: u32,
    pub full_threshold: u32,
    pub snapshot_overhead_threshold: Option<u32>,
}

// =============================================================================
// Operations
// =============================================================================

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<CapacityPolicyRecord>> {
    let Some(policy) = api.get_capacity_policy(name).await? else {
        return Ok(None);
    };
    Ok(Some(CapacityPolicyRecord {
        id: String::new(),
        obj_id: policy.id,
        name: policy.name,
        warning_threshold: policy.warning_threshold,
        error_threshold: policy.error_threshold,
        critical_threshold: policy.critical_threshold,
        full_threshold: policy.full_threshold,
        snapshot_overhead_threshold: policy.snapshot_overhead_threshold,
    }))
}

pub async fn create(api: &dyn SdpApi, spec: &CapacityPolicySpec) -> Result<CapacityPolicyRecord> {
    info!("Creating capacity policy {}", spec.name);

    let policy = api
        .create_capacity_policy(&CapacityPolicyCreate {
            name: spec.name.clone(),
            warning_threshold: spec.warning_threshold,
            error_threshold: spec.error_threshold,
            critical_threshold: spec.critical_threshold,
            full_threshold: PINNED_FULL_THRESHOLD,
            snapshot_overhead_threshold: spec.snapshot_overhead_threshold,
        })
        .await?;

    let mut record = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api(
            "CreateCapacityPolicy",
            format!("capacity policy {} vanished after creation", spec.name),
        )
    })?;
    record.id = synthetic_id(Kind::CapacityPolicy, policy.id);
    Ok(record)
}

pub async fn refresh(
    api: &dyn SdpApi,
    record: &CapacityPolicyRecord,
) -> Result<Option<CapacityPolicyRecord>> {
    Ok(observe(api, &record.name).await?.map(|mut observed| {
        observed.id = record.id.clone();
        observed
    }))
}

/// The endpoint has no PATCH method; any drift means replacement
pub async fn update(
    _api: &dyn SdpApi,
    record: &CapacityPolicyRecord,
    spec: &CapacityPolicySpec,
) -> Result<CapacityPolicyRecord> {
    let changed = changes(spec, record);
    if let Some(field) = changed.into_iter().next() {
        return Err(Error::Immutable {
            kind: "capacity_policy".into(),
            field,
        });
    }
    Ok(record.clone())
}

pub async fn delete(api: &dyn SdpApi, record: &CapacityPolicyRecord) -> Result<()> {
    info!("Deleting capacity policy {}", record.name);
    api.delete_capacity_policy(&record.name).await
}

pub async fn import(api: &dyn SdpApi, name: &str) -> Result<CapacityPolicyRecord> {
    let mut record = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "capacity_policy".into(),
        name: name.into(),
    })?;
    record.id = synthetic_id(Kind::CapacityPolicy, record.obj_id);
    Ok(record)
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &CapacityPolicySpec, record: &CapacityPolicyRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.warning_threshold != record.warning_threshold {
        changed.push("warning_threshold".to_string());
    }
    if spec.error_threshold != record.error_threshold {
        changed.push("error_threshold".to_string());
    }
    if spec.critical_threshold != record.critical_threshold {
        changed.push("critical_threshold".to_string());
    }
    if spec.snapshot_overhead_threshold != record.snapshot_overhead_threshold {
        changed.push("snapshot_overhead_threshold".to_string());
    }
    changed
}
