//! Plan/apply engine
//!
//! Drives the per-resource reconcilers from a declared manifest and the
//! recorded state. Every run starts by refreshing the recorded resources
//! against the array, so plans reflect live drift and not just stale records.
//!
//! Resources are created and updated in dependency order (policies, volume
//! groups, hosts, host groups, volumes) and deleted in the reverse order so
//! referents outlive their referrers. The engine is sequential and stops at
//! the first failure; everything applied up to that point stays recorded.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::resources::{
    capacity_policy, host, host_group, retention_policy, volume, volume_group, Kind,
};
use crate::sdp::SdpApi;
use crate::state::{Record, State};

// =============================================================================
// Plan
// =============================================================================

/// What apply would do to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create,
    /// Fields that drifted
    Update(Vec<String>),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub kind: Kind,
    pub name: String,
    pub action: Action,
}

/// Ordered set of changes a manifest implies against the refreshed state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.changes.is_empty() {
            return writeln!(f, "No changes. Declared state matches the array.");
        }
        for change in &self.changes {
            match &change.action {
                Action::Create => writeln!(f, "  + {}/{}", change.kind, change.name)?,
                Action::Update(fields) => writeln!(
                    f,
                    "  ~ {}/{} ({})",
                    change.kind,
                    change.name,
                    fields.join(", ")
                )?,
                Action::Delete => writeln!(f, "  - {}/{}", change.kind, change.name)?,
            }
        }
        Ok(())
    }
}

/// Counts of changes an apply run carried out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

// =============================================================================
// Refresh
// =============================================================================

/// Re-read every recorded resource from the array. Records for resources
/// deleted behind the reconciler's back are dropped from the state.
async fn refresh_state(api: &dyn SdpApi, state: &mut State) -> Result<()> {
    let keys: Vec<String> = state.resources.keys().cloned().collect();
    for key in keys {
        let Some(record) = state.resources.get(&key).cloned() else {
            continue;
        };
        let refreshed = match &record {
            Record::CapacityPolicy(r) => {
                capacity_policy::refresh(api, r).await?.map(Record::CapacityPolicy)
            }
            Record::RetentionPolicy(r) => {
                retention_policy::refresh(api, r).await?.map(Record::RetentionPolicy)
            }
            Record::VolumeGroup(r) => volume_group::refresh(api, r).await?.map(Record::VolumeGroup),
            Record::Host(r) => host::refresh(api, r).await?.map(Record::Host),
            Record::HostGroup(r) => host_group::refresh(api, r).await?.map(Record::HostGroup),
            Record::Volume(r) => volume::refresh(api, r).await?.map(Record::Volume),
        };
        match refreshed {
            Some(refreshed) => {
                state.resources.insert(key, refreshed);
            }
            None => {
                warn!("{} no longer exists on the array, dropping record", key);
                state.resources.remove(&key);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Plan
// =============================================================================

/// Compute what apply would do, without touching the array or the state file
pub async fn plan(api: &dyn SdpApi, manifest: &Manifest, state: &State) -> Result<Plan> {
    manifest.validate()?;

    let mut refreshed = state.clone();
    refresh_state(api, &mut refreshed).await?;

    let mut plan = Plan::default();

    // Departed resources first, referrers before referents
    for kind in Kind::ORDERED.iter().rev() {
        for name in refreshed.names_of(*kind) {
            if !declared(manifest, *kind, &name) {
                plan.changes.push(PlannedChange {
                    kind: *kind,
                    name,
                    action: Action::Delete,
                });
            }
        }
    }

    for kind in Kind::ORDERED {
        match kind {
            Kind::CapacityPolicy => {
                for spec in &manifest.capacity_policies {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::CapacityPolicy(r)) => Some(capacity_policy::changes(spec, r)),
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
            Kind::RetentionPolicy => {
                for spec in &manifest.retention_policies {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::RetentionPolicy(r)) => {
                            Some(retention_policy::changes(spec, r))
                        }
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
            Kind::VolumeGroup => {
                for spec in &manifest.volume_groups {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::VolumeGroup(r)) => Some(volume_group::changes(spec, r)),
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
            Kind::Host => {
                for spec in &manifest.hosts {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::Host(r)) => Some(host::changes(spec, r)),
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
            Kind::HostGroup => {
                for spec in &manifest.host_groups {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::HostGroup(r)) => Some(host_group::changes(spec, r)),
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
            Kind::Volume => {
                for spec in &manifest.volumes {
                    let drift = match refreshed.get(kind, &spec.name) {
                        Some(Record::Volume(r)) => Some(volume::changes(spec, r)),
                        _ => None,
                    };
                    push_change(&mut plan, kind, &spec.name, drift);
                }
            }
        }
    }

    Ok(plan)
}

/// `drift` is `None` for an unrecorded resource, `Some(fields)` otherwise
fn push_change(plan: &mut Plan, kind: Kind, name: &str, drift: Option<Vec<String>>) {
    match drift {
        None => plan.changes.push(PlannedChange {
            kind,
            name: name.to_string(),
            action: Action::Create,
        }),
        Some(fields) if !fields.is_empty() => plan.changes.push(PlannedChange {
            kind,
            name: name.to_string(),
            action: Action::Update(fields),
        }),
        Some(_) => {}
    }
}

fn declared(manifest: &Manifest, kind: Kind, name: &str) -> bool {
    match kind {
        Kind::CapacityPolicy => manifest.capacity_policies.iter().any(|s| s.name == name),
        Kind::RetentionPolicy => manifest.retention_policies.iter().any(|s| s.name == name),
        Kind::VolumeGroup => manifest.volume_groups.iter().any(|s| s.name == name),
        Kind::Host => manifest.hosts.iter().any(|s| s.name == name),
        Kind::HostGroup => manifest.host_groups.iter().any(|s| s.name == name),
        Kind::Volume => manifest.volumes.iter().any(|s| s.name == name),
    }
}

// =============================================================================
// Apply
// =============================================================================

/// Converge the array to the manifest, updating `state` as resources change.
///
/// Stops at the first failure; the state reflects everything applied before
/// the error, so the caller should persist it even on `Err`.
pub async fn apply(api: &dyn SdpApi, manifest: &Manifest, state: &mut State) -> Result<ApplyReport> {
    manifest.validate()?;
    refresh_state(api, state).await?;

    let mut report = ApplyReport::default();

    // Departed resources go first so their names and referents free up,
    // referrers before referents
    for kind in Kind::ORDERED.iter().rev() {
        for name in state.names_of(*kind) {
            if declared(manifest, *kind, &name) {
                continue;
            }
            if let Some(record) = state.get(*kind, &name).cloned() {
                delete_record(api, &record).await?;
                state.remove(*kind, &name);
                report.deleted += 1;
            }
        }
    }

    for kind in Kind::ORDERED {
        match kind {
            Kind::CapacityPolicy => {
                for spec in &manifest.capacity_policies {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::CapacityPolicy(record)) => {
                            if !capacity_policy::changes(spec, &record).is_empty() {
                                let updated = capacity_policy::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::CapacityPolicy(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = capacity_policy::create(api, spec).await?;
                            state.insert(&spec.name, Record::CapacityPolicy(record));
                            report.created += 1;
                        }
                    }
                }
            }
            Kind::RetentionPolicy => {
                for spec in &manifest.retention_policies {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::RetentionPolicy(record)) => {
                            if !retention_policy::changes(spec, &record).is_empty() {
                                let updated = retention_policy::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::RetentionPolicy(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = retention_policy::create(api, spec).await?;
                            state.insert(&spec.name, Record::RetentionPolicy(record));
                            report.created += 1;
                        }
                    }
                }
            }
            Kind::VolumeGroup => {
                for spec in &manifest.volume_groups {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::VolumeGroup(record)) => {
                            if !volume_group::changes(spec, &record).is_empty() {
                                let updated = volume_group::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::VolumeGroup(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = volume_group::create(api, spec).await?;
                            state.insert(&spec.name, Record::VolumeGroup(record));
                            report.created += 1;
                        }
                    }
                }
            }
            Kind::Host => {
                for spec in &manifest.hosts {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::Host(record)) => {
                            if !host::changes(spec, &record).is_empty() {
                                let updated = host::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::Host(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = host::create(api, spec).await?;
                            state.insert(&spec.name, Record::Host(record));
                            report.created += 1;
                        }
                    }
                }
            }
            Kind::HostGroup => {
                for spec in &manifest.host_groups {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::HostGroup(record)) => {
                            if !host_group::changes(spec, &record).is_empty() {
                                let updated = host_group::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::HostGroup(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = host_group::create(api, spec).await?;
                            state.insert(&spec.name, Record::HostGroup(record));
                            report.created += 1;
                        }
                    }
                }
            }
            Kind::Volume => {
                for spec in &manifest.volumes {
                    match state.get(kind, &spec.name).cloned() {
                        Some(Record::Volume(record)) => {
                            if !volume::changes(spec, &record).is_empty() {
                                let updated = volume::update(api, &record, spec).await?;
                                state.insert(&spec.name, Record::Volume(updated));
                                report.updated += 1;
                            }
                        }
                        _ => {
                            let record = volume::create(api, spec).await?;
                            state.insert(&spec.name, Record::Volume(record));
                            report.created += 1;
                        }
                    }
                }
            }
        }
    }

    info!(
        "Apply complete: {} created, {} updated, {} deleted",
        report.created, report.updated, report.deleted
    );
    Ok(report)
}

// =============================================================================
// Destroy
// =============================================================================

/// Delete every recorded resource, referrers before referents
pub async fn destroy(api: &dyn SdpApi, state: &mut State) -> Result<usize> {
    refresh_state(api, state).await?;

    let mut deleted = 0;
    for kind in Kind::ORDERED.iter().rev() {
        for name in state.names_of(*kind) {
            if let Some(record) = state.get(*kind, &name).cloned() {
                delete_record(api, &record).await?;
                state.remove(*kind, &name);
                deleted += 1;
            }
        }
    }

    info!("Destroy complete: {} resources deleted", deleted);
    Ok(deleted)
}

async fn delete_record(api: &dyn SdpApi, record: &Record) -> Result<()> {
    match record {
        Record::CapacityPolicy(r) => capacity_policy::delete(api, r).await,
        Record::RetentionPolicy(r) => retention_policy::delete(api, r).await,
        Record::VolumeGroup(r) => volume_group::delete(api, r).await,
        Record::Host(r) => host::delete(api, r).await,
        Record::HostGroup(r) => host_group::delete(api, r).await,
        Record::Volume(r) => volume::delete(api, r).await,
    }
}

// =============================================================================
// Import
// =============================================================================

/// Bring an existing array resource under management without recreating it
pub async fn import(
    api: &dyn SdpApi,
    state: &mut State,
    kind: Kind,
    name: &str,
) -> Result<Record> {
    if state.get(kind, name).is_some() {
        return Err(Error::Validation(format!(
            "{} is already under management",
            kind.key(name)
        )));
    }

    let record = match kind {
        Kind::CapacityPolicy => Record::CapacityPolicy(capacity_policy::import(api, name).await?),
        Kind::RetentionPolicy => {
            Record::RetentionPolicy(retention_policy::import(api, name).await?)
        }
        Kind::VolumeGroup => Record::VolumeGroup(volume_group::import(api, name).await?),
        Kind::Host => Record::Host(host::import(api, name).await?),
        Kind::HostGroup => Record::HostGroup(host_group::import(api, name).await?),
        Kind::Volume => Record::Volume(volume::import(api, name).await?),
    };

    info!("Imported {} as {}", kind.key(name), record.id());
    state.insert(name, record.clone());
    Ok(record)
}
