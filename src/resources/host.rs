//! Host reconciler
//!
//! A host carries a type, an optional list of FC PWWNs and at most one
//! iSCSI IQN. PWWN membership is reconciled with `membership_diff`; the IQN
//! is a scalar with attach/replace/clear semantics (replace detaches the
//! live IQN before attaching the declared one).

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::membership_diff;
use crate::error::{Error, Result};
use crate::resources::{sorted, synthetic_id, Kind};
use crate::sdp::{HostCreate, HostUpdate, SdpApi};

// =============================================================================
// Spec & Record
// =============================================================================

/// Declared host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    pub host_type: String,
    #[serde(default)]
    pub pwwns: Vec<String>,
    #[serde(default)]
    pub iqn: Option<String>,
}

/// Recorded host state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    pub obj_id: u64,
    pub name: String,
    pub host_type: String,
    /// Lexicographically sorted
    pub pwwns: Vec<String>,
    pub iqn: Option<String>,
}

// =============================================================================
// Operations
// =============================================================================

/// Observed attributes, before a synthetic id is assigned
struct Observed {
    obj_id: u64,
    name: String,
    host_type: String,
    pwwns: Vec<String>,
    iqn: Option<String>,
}

async fn observe(api: &dyn SdpApi, name: &str) -> Result<Option<Observed>> {
    let Some(host) = api.get_host(name).await? else {
        return Ok(None);
    };

    let pwwns = sorted(api.host_pwwns(name).await?);
    let iqn = api.host_iqns(name).await?.into_iter().next();

    Ok(Some(Observed {
        obj_id: host.id,
        name: host.name,
        host_type: host.host_type,
        pwwns,
        iqn,
    }))
}

fn record_from(observed: Observed, id: String) -> HostRecord {
    HostRecord {
        id,
        obj_id: observed.obj_id,
        name: observed.name,
        host_type: observed.host_type,
        pwwns: observed.pwwns,
        iqn: observed.iqn,
    }
}

/// Create the host and attach its declared PWWNs and IQN
pub async fn create(api: &dyn SdpApi, spec: &HostSpec) -> Result<HostRecord> {
    info!("Creating host {}", spec.name);

    let host = api
        .create_host(&HostCreate {
            name: spec.name.clone(),
            host_type: spec.host_type.clone(),
        })
        .await?;

    for pwwn in &spec.pwwns {
        api.attach_pwwn(&spec.name, pwwn).await?;
    }
    if let Some(iqn) = &spec.iqn {
        api.attach_iqn(&spec.name, iqn).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api("CreateHost", format!("host {} vanished after creation", spec.name))
    })?;
    Ok(record_from(observed, synthetic_id(Kind::Host, host.id)))
}

/// Re-read the live host, keeping the recorded synthetic id.
/// Returns `None` when the host no longer exists on the server.
pub async fn refresh(api: &dyn SdpApi, record: &HostRecord) -> Result<Option<HostRecord>> {
    Ok(observe(api, &record.name)
        .await?
        .map(|observed| record_from(observed, record.id.clone())))
}

/// Converge the live host from its recorded state to the declared spec
pub async fn update(api: &dyn SdpApi, record: &HostRecord, spec: &HostSpec) -> Result<HostRecord> {
    // Mapping operations address the host by its current live name; a rename
    // is pushed last so it cannot strand the relation calls.
    let current_name = record.name.as_str();

    let diff = membership_diff(&record.pwwns, &spec.pwwns);
    if !diff.is_empty() {
        debug!(
            "Host {}: {} pwwn detach(es), {} attach(es)",
            current_name,
            diff.to_remove.len(),
            diff.to_add.len()
        );
    }
    for pwwn in &diff.to_remove {
        api.detach_pwwn(current_name, pwwn).await?;
    }
    for pwwn in &diff.to_add {
        api.attach_pwwn(current_name, pwwn).await?;
    }

    if spec.iqn != record.iqn {
        if record.iqn.is_some() {
            api.detach_iqn(current_name).await?;
        }
        if let Some(iqn) = &spec.iqn {
            api.attach_iqn(current_name, iqn).await?;
        }
    }

    let mut patch = HostUpdate::default();
    if spec.name != record.name {
        patch.name = Some(spec.name.clone());
    }
    if spec.host_type != record.host_type {
        patch.host_type = Some(spec.host_type.clone());
    }
    if !patch.is_empty() {
        api.update_host(current_name, &patch).await?;
    }

    let observed = observe(api, &spec.name).await?.ok_or_else(|| {
        Error::api("UpdateHost", format!("host {} vanished during update", spec.name))
    })?;
    Ok(record_from(observed, record.id.clone()))
}

pub async fn delete(api: &dyn SdpApi, record: &HostRecord) -> Result<()> {
    info!("Deleting host {}", record.name);
    api.delete_host(&record.name).await
}

/// Rebuild a record from the live host, assigning a fresh synthetic id
pub async fn import(api: &dyn SdpApi, name: &str) -> Result<HostRecord> {
    let observed = observe(api, name).await?.ok_or_else(|| Error::NotFound {
        kind: "host".into(),
        name: name.into(),
    })?;
    let id = synthetic_id(Kind::Host, observed.obj_id);
    Ok(record_from(observed, id))
}

/// Fields that differ between the declared spec and the recorded state
pub fn changes(spec: &HostSpec, record: &HostRecord) -> Vec<String> {
    let mut changed = Vec::new();
    if spec.name != record.name {
        changed.push("name".to_string());
    }
    if spec.host_type != record.host_type {
        changed.push("host_type".to_string());
    }
    if !membership_diff(&record.pwwns, &spec.pwwns).is_empty() {
        changed.push("pwwns".to_string());
    }
    if spec.iqn != record.iqn {
        changed.push("iqn".to_string());
    }
    changed
}
