//! Silk SDP management API client
//!
//! The reconcilers talk to the array exclusively through the [`SdpApi`]
//! trait; [`client::SdpClient`] implements it over HTTPS. Tests substitute an
//! in-memory fake.

pub mod client;
pub mod types;

pub use client::{SdpClient, SdpClientConfig};
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Port to the Silk SDP management API.
///
/// One method per remote operation; relation reads return plain, unsorted
/// name lists and the callers own ordering and diffing. Lookups by name
/// return `Ok(None)` when the object does not exist, never an error.
#[async_trait]
pub trait SdpApi: Send + Sync {
    // =========================================================================
    // Volumes
    // =========================================================================
    async fn get_volumes(&self) -> Result<Vec<Volume>>;
    async fn get_volume(&self, name: &str) -> Result<Option<Volume>>;
    async fn create_volume(&self, req: &VolumeCreate) -> Result<Volume>;
    async fn update_volume(&self, name: &str, patch: &VolumeUpdate) -> Result<Volume>;
    async fn delete_volume(&self, name: &str) -> Result<()>;

    /// Names of hosts the volume is mapped to
    async fn volume_host_mappings(&self, volume: &str) -> Result<Vec<String>>;
    async fn map_host_to_volume(&self, host: &str, volume: &str) -> Result<()>;
    async fn unmap_host_from_volume(&self, host: &str, volume: &str) -> Result<()>;

    /// Names of host groups the volume is mapped to
    async fn volume_host_group_mappings(&self, volume: &str) -> Result<Vec<String>>;
    async fn map_host_group_to_volume(&self, group: &str, volume: &str) -> Result<()>;
    async fn unmap_host_group_from_volume(&self, group: &str, volume: &str) -> Result<()>;

    // =========================================================================
    // Volume Groups
    // =========================================================================
    async fn get_volume_groups(&self) -> Result<Vec<VolumeGroup>>;
    async fn get_volume_group(&self, name: &str) -> Result<Option<VolumeGroup>>;
    async fn create_volume_group(&self, req: &VolumeGroupCreate) -> Result<VolumeGroup>;
    async fn update_volume_group(
        &self,
        name: &str,
        patch: &VolumeGroupUpdate,
    ) -> Result<VolumeGroup>;
    async fn delete_volume_group(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Hosts
    // =========================================================================
    async fn get_hosts(&self) -> Result<Vec<Host>>;
    async fn get_host(&self, name: &str) -> Result<Option<Host>>;
    async fn create_host(&self, req: &HostCreate) -> Result<Host>;
    async fn update_host(&self, name: &str, patch: &HostUpdate) -> Result<Host>;
    async fn delete_host(&self, name: &str) -> Result<()>;

    async fn host_pwwns(&self, host: &str) -> Result<Vec<String>>;
    async fn attach_pwwn(&self, host: &str, pwwn: &str) -> Result<()>;
    async fn detach_pwwn(&self, host: &str, pwwn: &str) -> Result<()>;

    async fn host_iqns(&self, host: &str) -> Result<Vec<String>>;
    async fn attach_iqn(&self, host: &str, iqn: &str) -> Result<()>;
    /// Detach every IQN from the host; the SDP data model allows one
    async fn detach_iqn(&self, host: &str) -> Result<()>;

    // =========================================================================
    // Host Groups
    // =========================================================================
    async fn get_host_groups(&self) -> Result<Vec<HostGroup>>;
    async fn get_host_group(&self, name: &str) -> Result<Option<HostGroup>>;
    async fn create_host_group(&self, req: &HostGroupCreate) -> Result<HostGroup>;
    async fn update_host_group(&self, name: &str, patch: &HostGroupUpdate) -> Result<HostGroup>;
    async fn delete_host_group(&self, name: &str) -> Result<()>;

    /// Names of hosts that are members of the group
    async fn host_group_members(&self, group: &str) -> Result<Vec<String>>;
    async fn add_host_to_group(&self, host: &str, group: &str) -> Result<()>;
    async fn remove_host_from_group(&self, host: &str, group: &str) -> Result<()>;

    // =========================================================================
    // Capacity Policies
    // =========================================================================
    async fn get_capacity_policies(&self) -> Result<Vec<CapacityPolicy>>;
    async fn get_capacity_policy(&self, name: &str) -> Result<Option<CapacityPolicy>>;
    /// Resolve a capacity policy id (from a volume group ref) to its name
    async fn capacity_policy_name(&self, id: u64) -> Result<Option<String>>;
    async fn create_capacity_policy(&self, req: &CapacityPolicyCreate) -> Result<CapacityPolicy>;
    async fn delete_capacity_policy(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Retention Policies
    // =========================================================================
    async fn get_retention_policies(&self) -> Result<Vec<RetentionPolicy>>;
    async fn get_retention_policy(&self, name: &str) -> Result<Option<RetentionPolicy>>;
    async fn create_retention_policy(&self, req: &RetentionPolicyCreate)
        -> Result<RetentionPolicy>;
    async fn update_retention_policy(
        &self,
        name: &str,
        patch: &RetentionPolicyUpdate,
    ) -> Result<RetentionPolicy>;
    async fn delete_retention_policy(&self, name: &str) -> Result<()>;
}
