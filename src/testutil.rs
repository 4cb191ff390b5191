//! In-memory SDP server double for reconciler tests
//!
//! Mirrors the array's observable behavior closely enough to exercise the
//! reconcilers: unique names per collection, refusal to delete referenced
//! objects, one IQN per host, and no duplicate attachments. Error shapes
//! follow the HTTPS client: a missing target inside a compound operation
//! surfaces as [`Error::Api`] tagged with the operation name. Fixture data is
//! always created through the [`SdpApi`] methods by the test that needs it;
//! the fake holds no shared global identifiers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sdp::types::*;
use crate::sdp::SdpApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapTarget {
    Host(u64),
    HostGroup(u64),
}

#[derive(Debug, Clone)]
struct VolumeState {
    name: String,
    size: u64,
    description: String,
    read_only: bool,
    vmware_support: bool,
    volume_group: u64,
}

#[derive(Debug, Clone)]
struct VolumeGroupState {
    name: String,
    quota: Option<u64>,
    is_dedup: bool,
    description: String,
    capacity_policy: Option<u64>,
}

#[derive(Debug, Clone)]
struct HostState {
    name: String,
    host_type: String,
    host_group: Option<u64>,
}

#[derive(Debug, Clone)]
struct HostGroupState {
    name: String,
    description: String,
    allow_different_host_types: bool,
}

#[derive(Debug, Clone)]
struct CapacityPolicyState {
    name: String,
    warning_threshold: u32,
    error_threshold: u32,
    critical_threshold: u32,
    full_threshold: u32,
    snapshot_overhead_threshold: Option<u32>,
}

#[derive(Debug, Clone)]
struct RetentionPolicyState {
    name: String,
    num_snapshots: String,
    weeks: String,
    days: String,
    hours: String,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    volumes: BTreeMap<u64, VolumeState>,
    volume_groups: BTreeMap<u64, VolumeGroupState>,
    hosts: BTreeMap<u64, HostState>,
    host_groups: BTreeMap<u64, HostGroupState>,
    capacity_policies: BTreeMap<u64, CapacityPolicyState>,
    retention_policies: BTreeMap<u64, RetentionPolicyState>,
    /// (record id, host id, pwwn)
    pwwns: Vec<(u64, u64, String)>,
    /// (record id, host id, iqn)
    iqns: Vec<(u64, u64, String)>,
    /// (record id, volume id, target)
    mappings: Vec<(u64, u64, MapTarget)>,
    mutations: u64,
}

impl Inner {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// A missing target inside a compound operation reads as an operation
    /// failure, the same shape the HTTPS client produces
    fn volume_id(&self, name: &str, operation: &str) -> Result<u64> {
        self.volumes
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::api(operation, format!("volume {} does not exist", name)))
    }

    fn host_id(&self, name: &str, operation: &str) -> Result<u64> {
        self.hosts
            .iter()
            .find(|(_, h)| h.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::api(operation, format!("host {} does not exist", name)))
    }

    fn host_group_id(&self, name: &str, operation: &str) -> Result<u64> {
        self.host_groups
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::api(operation, format!("host_group {} does not exist", name)))
    }
}

/// In-memory [`SdpApi`] implementation
pub struct FakeSdp {
    inner: Mutex<Inner>,
}

impl FakeSdp {
    /// Fresh fake array, pre-seeded with the built-in default capacity policy
    pub fn new() -> Self {
        let fake = Self {
            inner: Mutex::new(Inner::default()),
        };
        {
            let mut inner = fake.inner.lock().unwrap();
            let id = inner.alloc();
            inner.capacity_policies.insert(
                id,
                CapacityPolicyState {
                    name: crate::resources::volume_group::DEFAULT_CAPACITY_POLICY.into(),
                    warning_threshold: 80,
                    error_threshold: 90,
                    critical_threshold: 95,
                    full_threshold: 100,
                    snapshot_overhead_threshold: None,
                },
            );
        }
        fake
    }

    /// Number of mutating API calls issued so far
    pub fn mutation_count(&self) -> u64 {
        self.inner.lock().unwrap().mutations
    }
}

fn to_volume(id: u64, state: &VolumeState) -> Volume {
    Volume {
        id,
        name: state.name.clone(),
        size: state.size,
        description: Some(state.description.clone()),
        read_only: state.read_only,
        vmware_support: state.vmware_support,
        scsi_sn: Some(format!("sn-{id:04x}")),
        volume_group: Some(ObjectRef::new("volume_groups", state.volume_group)),
    }
}

fn to_volume_group(id: u64, state: &VolumeGroupState) -> VolumeGroup {
    VolumeGroup {
        id,
        name: state.name.clone(),
        quota: state.quota,
        is_dedup: state.is_dedup,
        description: Some(state.description.clone()),
        capacity_policy: state
            .capacity_policy
            .map(|pid| ObjectRef::new("vg_capacity_policies", pid)),
    }
}

fn to_host(id: u64, state: &HostState) -> Host {
    Host {
        id,
        name: state.name.clone(),
        host_type: state.host_type.clone(),
        host_group: state.host_group.map(|gid| ObjectRef::new("host_groups", gid)),
    }
}

fn to_host_group(id: u64, state: &HostGroupState) -> HostGroup {
    HostGroup {
        id,
        name: state.name.clone(),
        description: Some(state.description.clone()),
        allow_different_host_types: state.allow_different_host_types,
    }
}

fn to_capacity_policy(id: u64, state: &CapacityPolicyState) -> CapacityPolicy {
    CapacityPolicy {
        id,
        name: state.name.clone(),
        warning_threshold: state.warning_threshold,
        error_threshold: state.error_threshold,
        critical_threshold: state.critical_threshold,
        full_threshold: state.full_threshold,
        snapshot_overhead_threshold: state.snapshot_overhead_threshold,
    }
}

fn to_retention_policy(id: u64, state: &RetentionPolicyState) -> RetentionPolicy {
    RetentionPolicy {
        id,
        name: state.name.clone(),
        num_snapshots: state.num_snapshots.clone(),
        weeks: state.weeks.clone(),
        days: state.days.clone(),
        hours: state.hours.clone(),
    }
}

#[async_trait]
impl SdpApi for FakeSdp {
    // =========================================================================
    // Volumes
    // =========================================================================

    async fn get_volumes(&self) -> Result<Vec<Volume>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.volumes.iter().map(|(id, v)| to_volume(*id, v)).collect())
    }

    async fn get_volume(&self, name: &str) -> Result<Option<Volume>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .volumes
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(id, v)| to_volume(*id, v)))
    }

    async fn create_volume(&self, req: &VolumeCreate) -> Result<Volume> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.volumes.values().any(|v| v.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "volume".into(),
                name: req.name.clone(),
            });
        }
        let group_id = req
            .volume_group
            .id()
            .filter(|id| inner.volume_groups.contains_key(id))
            .ok_or_else(|| Error::api("CreateVolume", "volume group ref does not exist"))?;
        let id = inner.alloc();
        let state = VolumeState {
            name: req.name.clone(),
            size: req.size,
            description: req.description.clone(),
            read_only: req.read_only,
            vmware_support: req.vmware_support,
            volume_group: group_id,
        };
        let volume = to_volume(id, &state);
        inner.volumes.insert(id, state);
        Ok(volume)
    }

    async fn update_volume(&self, name: &str, patch: &VolumeUpdate) -> Result<Volume> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.volume_id(name, "UpdateVolume")?;
        if let Some(group_ref) = &patch.volume_group {
            let gid = group_ref
                .id()
                .filter(|gid| inner.volume_groups.contains_key(gid))
                .ok_or_else(|| Error::api("UpdateVolume", "volume group ref does not exist"))?;
            inner.volumes.get_mut(&id).unwrap().volume_group = gid;
        }
        let state = inner.volumes.get_mut(&id).unwrap();
        if let Some(new_name) = &patch.name {
            state.name = new_name.clone();
        }
        if let Some(size) = patch.size {
            state.size = size;
        }
        if let Some(description) = &patch.description {
            state.description = description.clone();
        }
        if let Some(read_only) = patch.read_only {
            state.read_only = read_only;
        }
        let state = state.clone();
        Ok(to_volume(id, &state))
    }

    async fn delete_volume(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.volume_id(name, "DeleteVolume")?;
        if inner.mappings.iter().any(|(_, vid, _)| *vid == id) {
            return Err(Error::api(
                "DeleteVolume",
                format!("volume {} still has mappings", name),
            ));
        }
        inner.volumes.remove(&id);
        Ok(())
    }

    async fn volume_host_mappings(&self, volume: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let vid = inner.volume_id(volume, "GetVolumeHostMappings")?;
        Ok(inner
            .mappings
            .iter()
            .filter_map(|(_, v, target)| match target {
                MapTarget::Host(hid) if *v == vid => {
                    inner.hosts.get(hid).map(|h| h.name.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn map_host_to_volume(&self, host: &str, volume: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let hid = inner.host_id(host, "CreateHostVolumeMapping")?;
        let vid = inner.volume_id(volume, "CreateHostVolumeMapping")?;
        if inner
            .mappings
            .iter()
            .any(|(_, v, t)| *v == vid && *t == MapTarget::Host(hid))
        {
            return Err(Error::api(
                "CreateHostVolumeMapping",
                format!("host {} is already mapped to volume {}", host, volume),
            ));
        }
        let id = inner.alloc();
        inner.mappings.push((id, vid, MapTarget::Host(hid)));
        Ok(())
    }

    async fn unmap_host_from_volume(&self, host: &str, volume: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let hid = inner.host_id(host, "DeleteHostVolumeMapping")?;
        let vid = inner.volume_id(volume, "DeleteHostVolumeMapping")?;
        let before = inner.mappings.len();
        inner
            .mappings
            .retain(|(_, v, t)| !(*v == vid && *t == MapTarget::Host(hid)));
        if inner.mappings.len() == before {
            return Err(Error::api(
                "DeleteHostVolumeMapping",
                format!("host {} is not mapped to volume {}", host, volume),
            ));
        }
        Ok(())
    }

    async fn volume_host_group_mappings(&self, volume: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let vid = inner.volume_id(volume, "GetVolumeHostGroupMappings")?;
        Ok(inner
            .mappings
            .iter()
            .filter_map(|(_, v, target)| match target {
                MapTarget::HostGroup(gid) if *v == vid => {
                    inner.host_groups.get(gid).map(|g| g.name.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn map_host_group_to_volume(&self, group: &str, volume: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let gid = inner.host_group_id(group, "CreateHostGroupVolumeMapping")?;
        let vid = inner.volume_id(volume, "CreateHostGroupVolumeMapping")?;
        if inner
            .mappings
            .iter()
            .any(|(_, v, t)| *v == vid && *t == MapTarget::HostGroup(gid))
        {
            return Err(Error::api(
                "CreateHostGroupVolumeMapping",
                format!("host group {} is already mapped to volume {}", group, volume),
            ));
        }
        let id = inner.alloc();
        inner.mappings.push((id, vid, MapTarget::HostGroup(gid)));
        Ok(())
    }

    async fn unmap_host_group_from_volume(&self, group: &str, volume: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let gid = inner.host_group_id(group, "DeleteHostGroupVolumeMapping")?;
        let vid = inner.volume_id(volume, "DeleteHostGroupVolumeMapping")?;
        let before = inner.mappings.len();
        inner
            .mappings
            .retain(|(_, v, t)| !(*v == vid && *t == MapTarget::HostGroup(gid)));
        if inner.mappings.len() == before {
            return Err(Error::api(
                "DeleteHostGroupVolumeMapping",
                format!("host group {} is not mapped to volume {}", group, volume),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Volume Groups
    // =========================================================================

    async fn get_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .volume_groups
            .iter()
            .map(|(id, vg)| to_volume_group(*id, vg))
            .collect())
    }

    async fn get_volume_group(&self, name: &str) -> Result<Option<VolumeGroup>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .volume_groups
            .iter()
            .find(|(_, vg)| vg.name == name)
            .map(|(id, vg)| to_volume_group(*id, vg)))
    }

    async fn create_volume_group(&self, req: &VolumeGroupCreate) -> Result<VolumeGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.volume_groups.values().any(|vg| vg.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "volume_group".into(),
                name: req.name.clone(),
            });
        }
        let capacity_policy = match &req.capacity_policy {
            Some(policy_ref) => Some(
                policy_ref
                    .id()
                    .filter(|pid| inner.capacity_policies.contains_key(pid))
                    .ok_or_else(|| {
                        Error::api("CreateVolumeGroup", "capacity policy ref does not exist")
                    })?,
            ),
            None => None,
        };
        let id = inner.alloc();
        let state = VolumeGroupState {
            name: req.name.clone(),
            quota: req.quota,
            is_dedup: req.is_dedup,
            description: req.description.clone(),
            capacity_policy,
        };
        let group = to_volume_group(id, &state);
        inner.volume_groups.insert(id, state);
        Ok(group)
    }

    async fn update_volume_group(
        &self,
        name: &str,
        patch: &VolumeGroupUpdate,
    ) -> Result<VolumeGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner
            .volume_groups
            .iter()
            .find(|(_, vg)| vg.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::NotFound {
                kind: "volume_group".into(),
                name: name.into(),
            })?;
        if let Some(policy_ref) = &patch.capacity_policy {
            let pid = policy_ref
                .id()
                .filter(|pid| inner.capacity_policies.contains_key(pid))
                .ok_or_else(|| {
                    Error::api("UpdateVolumeGroup", "capacity policy ref does not exist")
                })?;
            inner.volume_groups.get_mut(&id).unwrap().capacity_policy = Some(pid);
        }
        let state = inner.volume_groups.get_mut(&id).unwrap();
        if let Some(new_name) = &patch.name {
            state.name = new_name.clone();
        }
        if let Some(quota) = patch.quota {
            state.quota = quota;
        }
        if let Some(description) = &patch.description {
            state.description = description.clone();
        }
        let state = state.clone();
        Ok(to_volume_group(id, &state))
    }

    async fn delete_volume_group(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner
            .volume_groups
            .iter()
            .find(|(_, vg)| vg.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::NotFound {
                kind: "volume_group".into(),
                name: name.into(),
            })?;
        if inner.volumes.values().any(|v| v.volume_group == id) {
            return Err(Error::api(
                "DeleteVolumeGroup",
                format!("volume group {} still contains volumes", name),
            ));
        }
        inner.volume_groups.remove(&id);
        Ok(())
    }

    // =========================================================================
    // Hosts
    // =========================================================================

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hosts.iter().map(|(id, h)| to_host(*id, h)).collect())
    }

    async fn get_host(&self, name: &str) -> Result<Option<Host>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hosts
            .iter()
            .find(|(_, h)| h.name == name)
            .map(|(id, h)| to_host(*id, h)))
    }

    async fn create_host(&self, req: &HostCreate) -> Result<Host> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.hosts.values().any(|h| h.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "host".into(),
                name: req.name.clone(),
            });
        }
        let id = inner.alloc();
        let state = HostState {
            name: req.name.clone(),
            host_type: req.host_type.clone(),
            host_group: None,
        };
        let host = to_host(id, &state);
        inner.hosts.insert(id, state);
        Ok(host)
    }

    async fn update_host(&self, name: &str, patch: &HostUpdate) -> Result<Host> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(name, "UpdateHost")?;
        let state = inner.hosts.get_mut(&id).unwrap();
        if let Some(new_name) = &patch.name {
            state.name = new_name.clone();
        }
        if let Some(host_type) = &patch.host_type {
            state.host_type = host_type.clone();
        }
        let state = state.clone();
        Ok(to_host(id, &state))
    }

    async fn delete_host(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(name, "DeleteHost")?;
        if inner
            .mappings
            .iter()
            .any(|(_, _, t)| *t == MapTarget::Host(id))
        {
            return Err(Error::api(
                "DeleteHost",
                format!("host {} still has volume mappings", name),
            ));
        }
        inner.hosts.remove(&id);
        inner.pwwns.retain(|(_, hid, _)| *hid != id);
        inner.iqns.retain(|(_, hid, _)| *hid != id);
        Ok(())
    }

    async fn host_pwwns(&self, host: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.host_id(host, "GetHostPwwns")?;
        Ok(inner
            .pwwns
            .iter()
            .filter(|(_, hid, _)| *hid == id)
            .map(|(_, _, pwwn)| pwwn.clone())
            .collect())
    }

    async fn attach_pwwn(&self, host: &str, pwwn: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(host, "CreateHostPwwn")?;
        if inner.pwwns.iter().any(|(_, hid, p)| *hid == id && p == pwwn) {
            return Err(Error::api(
                "CreateHostPwwn",
                format!("pwwn {} is already attached to host {}", pwwn, host),
            ));
        }
        let rec = inner.alloc();
        inner.pwwns.push((rec, id, pwwn.to_string()));
        Ok(())
    }

    async fn detach_pwwn(&self, host: &str, pwwn: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(host, "DeleteHostPwwn")?;
        let before = inner.pwwns.len();
        inner.pwwns.retain(|(_, hid, p)| !(*hid == id && p == pwwn));
        if inner.pwwns.len() == before {
            return Err(Error::api(
                "DeleteHostPwwn",
                format!("pwwn {} is not attached to host {}", pwwn, host),
            ));
        }
        Ok(())
    }

    async fn host_iqns(&self, host: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.host_id(host, "GetHostIqns")?;
        Ok(inner
            .iqns
            .iter()
            .filter(|(_, hid, _)| *hid == id)
            .map(|(_, _, iqn)| iqn.clone())
            .collect())
    }

    async fn attach_iqn(&self, host: &str, iqn: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(host, "CreateHostIqn")?;
        if inner.iqns.iter().any(|(_, hid, _)| *hid == id) {
            return Err(Error::api(
                "CreateHostIqn",
                format!("host {} already has an IQN attached", host),
            ));
        }
        let rec = inner.alloc();
        inner.iqns.push((rec, id, iqn.to_string()));
        Ok(())
    }

    async fn detach_iqn(&self, host: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_id(host, "DeleteHostIqn")?;
        inner.iqns.retain(|(_, hid, _)| *hid != id);
        Ok(())
    }

    // =========================================================================
    // Host Groups
    // =========================================================================

    async fn get_host_groups(&self) -> Result<Vec<HostGroup>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .host_groups
            .iter()
            .map(|(id, g)| to_host_group(*id, g))
            .collect())
    }

    async fn get_host_group(&self, name: &str) -> Result<Option<HostGroup>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .host_groups
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(id, g)| to_host_group(*id, g)))
    }

    async fn create_host_group(&self, req: &HostGroupCreate) -> Result<HostGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.host_groups.values().any(|g| g.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "host_group".into(),
                name: req.name.clone(),
            });
        }
        let id = inner.alloc();
        let state = HostGroupState {
            name: req.name.clone(),
            description: req.description.clone(),
            allow_different_host_types: req.allow_different_host_types,
        };
        let group = to_host_group(id, &state);
        inner.host_groups.insert(id, state);
        Ok(group)
    }

    async fn update_host_group(&self, name: &str, patch: &HostGroupUpdate) -> Result<HostGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_group_id(name, "UpdateHostGroup")?;
        let state = inner.host_groups.get_mut(&id).unwrap();
        if let Some(description) = &patch.description {
            state.description = description.clone();
        }
        if let Some(allow) = patch.allow_different_host_types {
            state.allow_different_host_types = allow;
        }
        let state = state.clone();
        Ok(to_host_group(id, &state))
    }

    async fn delete_host_group(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner.host_group_id(name, "DeleteHostGroup")?;
        inner.host_groups.remove(&id);
        for host in inner.hosts.values_mut() {
            if host.host_group == Some(id) {
                host.host_group = None;
            }
        }
        Ok(())
    }

    async fn host_group_members(&self, group: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let id = inner.host_group_id(group, "GetHostGroupHosts")?;
        Ok(inner
            .hosts
            .values()
            .filter(|h| h.host_group == Some(id))
            .map(|h| h.name.clone())
            .collect())
    }

    async fn add_host_to_group(&self, host: &str, group: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let hid = inner.host_id(host, "CreateHostHostGroupMapping")?;
        let gid = inner.host_group_id(group, "CreateHostHostGroupMapping")?;
        inner.hosts.get_mut(&hid).unwrap().host_group = Some(gid);
        Ok(())
    }

    async fn remove_host_from_group(&self, host: &str, group: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let hid = inner.host_id(host, "DeleteHostHostGroupMapping")?;
        let gid = inner.host_group_id(group, "DeleteHostHostGroupMapping")?;
        let state = inner.hosts.get_mut(&hid).unwrap();
        if state.host_group != Some(gid) {
            return Err(Error::api(
                "DeleteHostHostGroupMapping",
                format!("host {} is not in host group {}", host, group),
            ));
        }
        state.host_group = None;
        Ok(())
    }

    // =========================================================================
    // Capacity Policies
    // =========================================================================

    async fn get_capacity_policies(&self) -> Result<Vec<CapacityPolicy>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .capacity_policies
            .iter()
            .map(|(id, p)| to_capacity_policy(*id, p))
            .collect())
    }

    async fn get_capacity_policy(&self, name: &str) -> Result<Option<CapacityPolicy>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .capacity_policies
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, p)| to_capacity_policy(*id, p)))
    }

    async fn capacity_policy_name(&self, id: u64) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.capacity_policies.get(&id).map(|p| p.name.clone()))
    }

    async fn create_capacity_policy(&self, req: &CapacityPolicyCreate) -> Result<CapacityPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.capacity_policies.values().any(|p| p.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "capacity_policy".into(),
                name: req.name.clone(),
            });
        }
        let id = inner.alloc();
        // The real endpoint pins full_threshold to 100 no matter the request
        let state = CapacityPolicyState {
            name: req.name.clone(),
            warning_threshold: req.warning_threshold,
            error_threshold: req.error_threshold,
            critical_threshold: req.critical_threshold,
            full_threshold: 100,
            snapshot_overhead_threshold: req.snapshot_overhead_threshold,
        };
        let policy = to_capacity_policy(id, &state);
        inner.capacity_policies.insert(id, state);
        Ok(policy)
    }

    async fn delete_capacity_policy(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner
            .capacity_policies
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::NotFound {
                kind: "capacity_policy".into(),
                name: name.into(),
            })?;
        if inner
            .volume_groups
            .values()
            .any(|vg| vg.capacity_policy == Some(id))
        {
            return Err(Error::api(
                "DeleteCapacityPolicy",
                format!("capacity policy {} is still referenced", name),
            ));
        }
        inner.capacity_policies.remove(&id);
        Ok(())
    }

    // =========================================================================
    // Retention Policies
    // =========================================================================

    async fn get_retention_policies(&self) -> Result<Vec<RetentionPolicy>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .retention_policies
            .iter()
            .map(|(id, p)| to_retention_policy(*id, p))
            .collect())
    }

    async fn get_retention_policy(&self, name: &str) -> Result<Option<RetentionPolicy>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .retention_policies
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, p)| to_retention_policy(*id, p)))
    }

    async fn create_retention_policy(
        &self,
        req: &RetentionPolicyCreate,
    ) -> Result<RetentionPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        if inner.retention_policies.values().any(|p| p.name == req.name) {
            return Err(Error::AlreadyExists {
                kind: "retention_policy".into(),
                name: req.name.clone(),
            });
        }
        let id = inner.alloc();
        let state = RetentionPolicyState {
            name: req.name.clone(),
            num_snapshots: req.num_snapshots.clone(),
            weeks: req.weeks.clone(),
            days: req.days.clone(),
            hours: req.hours.clone(),
        };
        let policy = to_retention_policy(id, &state);
        inner.retention_policies.insert(id, state);
        Ok(policy)
    }

    async fn update_retention_policy(
        &self,
        name: &str,
        patch: &RetentionPolicyUpdate,
    ) -> Result<RetentionPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner
            .retention_policies
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::NotFound {
                kind: "retention_policy".into(),
                name: name.into(),
            })?;
        let state = inner.retention_policies.get_mut(&id).unwrap();
        if let Some(new_name) = &patch.name {
            state.name = new_name.clone();
        }
        if let Some(num_snapshots) = &patch.num_snapshots {
            state.num_snapshots = num_snapshots.clone();
        }
        if let Some(weeks) = &patch.weeks {
            state.weeks = weeks.clone();
        }
        if let Some(days) = &patch.days {
            state.days = days.clone();
        }
        if let Some(hours) = &patch.hours {
            state.hours = hours.clone();
        }
        let state = state.clone();
        Ok(to_retention_policy(id, &state))
    }

    async fn delete_retention_policy(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations += 1;
        let id = inner
            .retention_policies
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::NotFound {
                kind: "retention_policy".into(),
                name: name.into(),
            })?;
        inner.retention_policies.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_relation_target_is_api_error() {
        let api = FakeSdp::new();

        let err = api.map_host_to_volume("ghost", "db-data").await.unwrap_err();
        match err {
            Error::Api { operation, reason } => {
                assert_eq!(operation, "CreateHostVolumeMapping");
                assert!(reason.contains("ghost"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = api.attach_pwwn("ghost", "50:00").await.unwrap_err();
        assert!(matches!(err, Error::Api { .. }));
    }

    #[tokio::test]
    async fn test_plain_lookup_miss_is_none() {
        let api = FakeSdp::new();
        assert!(api.get_volume("absent").await.unwrap().is_none());
        assert!(api.get_host("absent").await.unwrap().is_none());
        assert!(api.get_host_group("absent").await.unwrap().is_none());
    }
}
