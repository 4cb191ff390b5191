//! HTTPS client for the Silk SDP management API
//!
//! Thin transport layer: basic auth, JSON bodies, per-request timeout, and
//! translation of SDP error payloads into [`Error::Api`]. Object names are
//! resolved to numeric ids here so the rest of the crate can work purely in
//! names.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sdp::types::*;
use crate::sdp::SdpApi;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one SDP server
#[derive(Debug, Clone)]
pub struct SdpClientConfig {
    /// IP address or hostname of the SDP server
    pub server: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Accept self-signed certificates, common on array management ports
    pub accept_invalid_certs: bool,
}

impl Default for SdpClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(15),
            accept_invalid_certs: false,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Error payload shape returned by the SDP API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_msg: Option<String>,
}

/// HTTPS implementation of [`SdpApi`]
pub struct SdpClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

// Hand-written so the password never reaches log output
impl std::fmt::Debug for SdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdpClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SdpClient {
    /// Build a client for the configured SDP server
    pub fn new(config: SdpClientConfig) -> Result<Self> {
        if config.server.is_empty() {
            return Err(Error::Configuration("SDP server address is empty".into()));
        }
        if config.username.is_empty() {
            return Err(Error::Configuration("SDP username is empty".into()));
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("https://{}/api/v2", config.server),
            username: config.username,
            password: config.password,
            timeout: config.timeout,
        })
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        operation: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("SDP request: {} {}", method, url);

        let mut req = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = check_status(req.send().await?, operation).await?;
        Ok(response.json::<T>().await?)
    }

    async fn get_hits<T: DeserializeOwned>(&self, path: &str, operation: &str) -> Result<Vec<T>> {
        let hits: Hits<T> = self
            .request::<(), _>(Method::GET, path, operation, None)
            .await?;
        Ok(hits.hits)
    }

    /// DELETE endpoints return 204 with an empty body; nothing to parse
    async fn delete(&self, path: &str, operation: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!("SDP request: DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response, operation).await?;
        Ok(())
    }

    /// Resolve a volume name to its live object
    async fn volume_by_name(&self, name: &str, operation: &str) -> Result<Volume> {
        self.get_volume(name).await?.ok_or_else(|| Error::NotFound {
            kind: "volume".into(),
            name: name.into(),
        })
        .map_err(|e| annotate_missing(e, operation))
    }

    async fn host_by_name(&self, name: &str, operation: &str) -> Result<Host> {
        self.get_host(name).await?.ok_or_else(|| Error::NotFound {
            kind: "host".into(),
            name: name.into(),
        })
        .map_err(|e| annotate_missing(e, operation))
    }

    async fn host_group_by_name(&self, name: &str, operation: &str) -> Result<HostGroup> {
        self.get_host_group(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "host_group".into(),
                name: name.into(),
            })
            .map_err(|e| annotate_missing(e, operation))
    }

    /// Fetch the FC port records attached to a host
    async fn host_pwwn_records(&self, host: &Host) -> Result<Vec<HostPwwn>> {
        let path = format!(
            "/host_fc_ports?host__ref={}",
            urlencoding::encode(&format!("/hosts/{}", host.id))
        );
        self.get_hits(&path, "GetHostPwwns").await
    }

    async fn host_iqn_records(&self, host: &Host) -> Result<Vec<HostIqn>> {
        let path = format!(
            "/host_iqns?host__ref={}",
            urlencoding::encode(&format!("/hosts/{}", host.id))
        );
        self.get_hits(&path, "GetHostIqns").await
    }

    /// Fetch the mapping records for a volume
    async fn volume_mapping_records(&self, volume: &Volume) -> Result<Vec<Mapping>> {
        let path = format!(
            "/mappings?volume__ref={}",
            urlencoding::encode(&format!("/volumes/{}", volume.id))
        );
        self.get_hits(&path, "GetVolumeMappings").await
    }
}

/// Translate a non-2xx response into [`Error::Api`], preferring the server's
/// `error_msg` payload over the bare status code
async fn check_status(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let reason = match response.json::<ApiErrorBody>().await {
        Ok(body) => body.error_msg.unwrap_or_else(|| format!("HTTP {}", status)),
        Err(_) => format!("HTTP {}", status),
    };
    if status == StatusCode::CONFLICT {
        return Err(Error::api(operation, format!("conflict: {}", reason)));
    }
    Err(Error::api(operation, reason))
}

/// A lookup miss during a compound operation is an operation failure, not a
/// plain read miss
fn annotate_missing(err: Error, operation: &str) -> Error {
    match err {
        Error::NotFound { kind, name } => {
            Error::api(operation, format!("{} {} does not exist", kind, name))
        }
        other => other,
    }
}

fn by_name_path(collection: &str, name: &str) -> String {
    format!("/{}?name={}", collection, urlencoding::encode(name))
}

#[async_trait]
impl SdpApi for SdpClient {
    // =========================================================================
    // Volumes
    // =========================================================================

    async fn get_volumes(&self) -> Result<Vec<Volume>> {
        self.get_hits("/volumes", "GetVolumes").await
    }

    async fn get_volume(&self, name: &str) -> Result<Option<Volume>> {
        let hits: Vec<Volume> = self
            .get_hits(&by_name_path("volumes", name), "GetVolume")
            .await?;
        Ok(hits.into_iter().find(|v| v.name == name))
    }

    async fn create_volume(&self, req: &VolumeCreate) -> Result<Volume> {
        self.request(Method::POST, "/volumes", "CreateVolume", Some(req))
            .await
    }

    async fn update_volume(&self, name: &str, patch: &VolumeUpdate) -> Result<Volume> {
        let volume = self.volume_by_name(name, "UpdateVolume").await?;
        self.request(
            Method::PATCH,
            &format!("/volumes/{}", volume.id),
            "UpdateVolume",
            Some(patch),
        )
        .await
    }

    async fn delete_volume(&self, name: &str) -> Result<()> {
        let volume = self.volume_by_name(name, "DeleteVolume").await?;
        self.delete(&format!("/volumes/{}", volume.id), "DeleteVolume")
            .await
    }

    async fn volume_host_mappings(&self, volume: &str) -> Result<Vec<String>> {
        let volume = self.volume_by_name(volume, "GetVolumeHostMappings").await?;
        let mappings = self.volume_mapping_records(&volume).await?;

        let hosts = self.get_hosts().await?;
        let mut names = Vec::new();
        for mapping in mappings {
            let Some(host_ref) = mapping.host.as_ref().and_then(ObjectRef::id) else {
                continue;
            };
            if let Some(host) = hosts.iter().find(|h| h.id == host_ref) {
                names.push(host.name.clone());
            }
        }
        Ok(names)
    }

    async fn map_host_to_volume(&self, host: &str, volume: &str) -> Result<()> {
        let host = self.host_by_name(host, "CreateHostVolumeMapping").await?;
        let volume = self
            .volume_by_name(volume, "CreateHostVolumeMapping")
            .await?;
        let body = json!({
            "volume": ObjectRef::new("volumes", volume.id),
            "host": ObjectRef::new("hosts", host.id),
        });
        self.request::<_, Mapping>(Method::POST, "/mappings", "CreateHostVolumeMapping", Some(&body))
            .await?;
        Ok(())
    }

    async fn unmap_host_from_volume(&self, host: &str, volume: &str) -> Result<()> {
        let host = self.host_by_name(host, "DeleteHostVolumeMapping").await?;
        let volume = self
            .volume_by_name(volume, "DeleteHostVolumeMapping")
            .await?;
        let mappings = self.volume_mapping_records(&volume).await?;
        for mapping in mappings {
            if mapping.host.as_ref().and_then(ObjectRef::id) == Some(host.id) {
                return self
                    .delete(
                        &format!("/mappings/{}", mapping.id),
                        "DeleteHostVolumeMapping",
                    )
                    .await;
            }
        }
        Err(Error::api(
            "DeleteHostVolumeMapping",
            format!("host {} is not mapped to volume {}", host.name, volume.name),
        ))
    }

    async fn volume_host_group_mappings(&self, volume: &str) -> Result<Vec<String>> {
        let volume = self
            .volume_by_name(volume, "GetVolumeHostGroupMappings")
            .await?;
        let mappings = self.volume_mapping_records(&volume).await?;

        let groups = self.get_host_groups().await?;
        let mut names = Vec::new();
        for mapping in mappings {
            let Some(group_id) = mapping.host_group.as_ref().and_then(ObjectRef::id) else {
                continue;
            };
            if let Some(group) = groups.iter().find(|g| g.id == group_id) {
                names.push(group.name.clone());
            }
        }
        Ok(names)
    }

    async fn map_host_group_to_volume(&self, group: &str, volume: &str) -> Result<()> {
        let group = self
            .host_group_by_name(group, "CreateHostGroupVolumeMapping")
            .await?;
        let volume = self
            .volume_by_name(volume, "CreateHostGroupVolumeMapping")
            .await?;
        let body = json!({
            "volume": ObjectRef::new("volumes", volume.id),
            "host_group": ObjectRef::new("host_groups", group.id),
        });
        self.request::<_, Mapping>(
            Method::POST,
            "/mappings",
            "CreateHostGroupVolumeMapping",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn unmap_host_group_from_volume(&self, group: &str, volume: &str) -> Result<()> {
        let group = self
            .host_group_by_name(group, "DeleteHostGroupVolumeMapping")
            .await?;
        let volume = self
            .volume_by_name(volume, "DeleteHostGroupVolumeMapping")
            .await?;
        let mappings = self.volume_mapping_records(&volume).await?;
        for mapping in mappings {
            if mapping.host_group.as_ref().and_then(ObjectRef::id) == Some(group.id) {
                return self
                    .delete(
                        &format!("/mappings/{}", mapping.id),
                        "DeleteHostGroupVolumeMapping",
                    )
                    .await;
            }
        }
        Err(Error::api(
            "DeleteHostGroupVolumeMapping",
            format!(
                "host group {} is not mapped to volume {}",
                group.name, volume.name
            ),
        ))
    }

    // =========================================================================
    // Volume Groups
    // =========================================================================

    async fn get_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        self.get_hits("/volume_groups", "GetVolumeGroups").await
    }

    async fn get_volume_group(&self, name: &str) -> Result<Option<VolumeGroup>> {
        let hits: Vec<VolumeGroup> = self
            .get_hits(&by_name_path("volume_groups", name), "GetVolumeGroup")
            .await?;
        Ok(hits.into_iter().find(|vg| vg.name == name))
    }

    async fn create_volume_group(&self, req: &VolumeGroupCreate) -> Result<VolumeGroup> {
        self.request(Method::POST, "/volume_groups", "CreateVolumeGroup", Some(req))
            .await
    }

    async fn update_volume_group(
        &self,
        name: &str,
        patch: &VolumeGroupUpdate,
    ) -> Result<VolumeGroup> {
        let group = self
            .get_volume_group(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "volume_group".into(),
                name: name.into(),
            })?;
        self.request(
            Method::PATCH,
            &format!("/volume_groups/{}", group.id),
            "UpdateVolumeGroup",
            Some(patch),
        )
        .await
    }

    async fn delete_volume_group(&self, name: &str) -> Result<()> {
        let group = self
            .get_volume_group(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "volume_group".into(),
                name: name.into(),
            })?;
        self.delete(&format!("/volume_groups/{}", group.id), "DeleteVolumeGroup")
            .await
    }

    // =========================================================================
    // Hosts
    // =========================================================================

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        self.get_hits("/hosts", "GetHosts").await
    }

    async fn get_host(&self, name: &str) -> Result<Option<Host>> {
        let hits: Vec<Host> = self.get_hits(&by_name_path("hosts", name), "GetHost").await?;
        Ok(hits.into_iter().find(|h| h.name == name))
    }

    async fn create_host(&self, req: &HostCreate) -> Result<Host> {
        self.request(Method::POST, "/hosts", "CreateHost", Some(req))
            .await
    }

    async fn update_host(&self, name: &str, patch: &HostUpdate) -> Result<Host> {
        let host = self.host_by_name(name, "UpdateHost").await?;
        self.request(
            Method::PATCH,
            &format!("/hosts/{}", host.id),
            "UpdateHost",
            Some(patch),
        )
        .await
    }

    async fn delete_host(&self, name: &str) -> Result<()> {
        let host = self.host_by_name(name, "DeleteHost").await?;
        self.delete(&format!("/hosts/{}", host.id), "DeleteHost").await
    }

    async fn host_pwwns(&self, host: &str) -> Result<Vec<String>> {
        let host = self.host_by_name(host, "GetHostPwwns").await?;
        let records = self.host_pwwn_records(&host).await?;
        Ok(records.into_iter().map(|r| r.pwwn).collect())
    }

    async fn attach_pwwn(&self, host: &str, pwwn: &str) -> Result<()> {
        let host = self.host_by_name(host, "CreateHostPwwn").await?;
        let body = json!({
            "pwwn": pwwn,
            "host": ObjectRef::new("hosts", host.id),
        });
        self.request::<_, HostPwwn>(Method::POST, "/host_fc_ports", "CreateHostPwwn", Some(&body))
            .await?;
        Ok(())
    }

    async fn detach_pwwn(&self, host: &str, pwwn: &str) -> Result<()> {
        let host = self.host_by_name(host, "DeleteHostPwwn").await?;
        let records = self.host_pwwn_records(&host).await?;
        for record in records {
            if record.pwwn == pwwn {
                return self
                    .delete(&format!("/host_fc_ports/{}", record.id), "DeleteHostPwwn")
                    .await;
            }
        }
        Err(Error::api(
            "DeleteHostPwwn",
            format!("pwwn {} is not attached to host {}", pwwn, host.name),
        ))
    }

    async fn host_iqns(&self, host: &str) -> Result<Vec<String>> {
        let host = self.host_by_name(host, "GetHostIqns").await?;
        let records = self.host_iqn_records(&host).await?;
        Ok(records.into_iter().map(|r| r.iqn).collect())
    }

    async fn attach_iqn(&self, host: &str, iqn: &str) -> Result<()> {
        let host = self.host_by_name(host, "CreateHostIqn").await?;
        let body = json!({
            "iqn": iqn,
            "host": ObjectRef::new("hosts", host.id),
        });
        self.request::<_, HostIqn>(Method::POST, "/host_iqns", "CreateHostIqn", Some(&body))
            .await?;
        Ok(())
    }

    async fn detach_iqn(&self, host: &str) -> Result<()> {
        let host = self.host_by_name(host, "DeleteHostIqn").await?;
        let records = self.host_iqn_records(&host).await?;
        for record in records {
            self.delete(&format!("/host_iqns/{}", record.id), "DeleteHostIqn")
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // Host Groups
    // =========================================================================

    async fn get_host_groups(&self) -> Result<Vec<HostGroup>> {
        self.get_hits("/host_groups", "GetHostGroups").await
    }

    async fn get_host_group(&self, name: &str) -> Result<Option<HostGroup>> {
        let hits: Vec<HostGroup> = self
            .get_hits(&by_name_path("host_groups", name), "GetHostGroup")
            .await?;
        Ok(hits.into_iter().find(|g| g.name == name))
    }

    async fn create_host_group(&self, req: &HostGroupCreate) -> Result<HostGroup> {
        self.request(Method::POST, "/host_groups", "CreateHostGroup", Some(req))
            .await
    }

    async fn update_host_group(&self, name: &str, patch: &HostGroupUpdate) -> Result<HostGroup> {
        let group = self.host_group_by_name(name, "UpdateHostGroup").await?;
        self.request(
            Method::PATCH,
            &format!("/host_groups/{}", group.id),
            "UpdateHostGroup",
            Some(patch),
        )
        .await
    }

    async fn delete_host_group(&self, name: &str) -> Result<()> {
        let group = self.host_group_by_name(name, "DeleteHostGroup").await?;
        self.delete(&format!("/host_groups/{}", group.id), "DeleteHostGroup")
            .await
    }

    async fn host_group_members(&self, group: &str) -> Result<Vec<String>> {
        let group = self.host_group_by_name(group, "GetHostGroupHosts").await?;
        let hosts = self.get_hosts().await?;
        Ok(hosts
            .into_iter()
            .filter(|h| h.host_group.as_ref().and_then(ObjectRef::id) == Some(group.id))
            .map(|h| h.name)
            .collect())
    }

    async fn add_host_to_group(&self, host: &str, group: &str) -> Result<()> {
        let host = self.host_by_name(host, "CreateHostHostGroupMapping").await?;
        let group = self
            .host_group_by_name(group, "CreateHostHostGroupMapping")
            .await?;
        let body = json!({"host_group": ObjectRef::new("host_groups", group.id)});
        self.request::<_, Host>(
            Method::PATCH,
            &format!("/hosts/{}", host.id),
            "CreateHostHostGroupMapping",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn remove_host_from_group(&self, host: &str, group: &str) -> Result<()> {
        let host = self.host_by_name(host, "DeleteHostHostGroupMapping").await?;
        let group = self
            .host_group_by_name(group, "DeleteHostHostGroupMapping")
            .await?;
        if host.host_group.as_ref().and_then(ObjectRef::id) != Some(group.id) {
            return Err(Error::api(
                "DeleteHostHostGroupMapping",
                format!("host {} is not in host group {}", host.name, group.name),
            ));
        }
        let body = json!({ "host_group": serde_json::Value::Null });
        self.request::<_, Host>(
            Method::PATCH,
            &format!("/hosts/{}", host.id),
            "DeleteHostHostGroupMapping",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Capacity Policies
    // =========================================================================

    async fn get_capacity_policies(&self) -> Result<Vec<CapacityPolicy>> {
        self.get_hits("/vg_capacity_policies", "GetCapacityPolicies")
            .await
    }

    async fn get_capacity_policy(&self, name: &str) -> Result<Option<CapacityPolicy>> {
        let hits: Vec<CapacityPolicy> = self
            .get_hits(
                &by_name_path("vg_capacity_policies", name),
                "GetCapacityPolicy",
            )
            .await?;
        Ok(hits.into_iter().find(|p| p.name == name))
    }

    async fn capacity_policy_name(&self, id: u64) -> Result<Option<String>> {
        let policies = self.get_capacity_policies().await?;
        Ok(policies.into_iter().find(|p| p.id == id).map(|p| p.name))
    }

    async fn create_capacity_policy(&self, req: &CapacityPolicyCreate) -> Result<CapacityPolicy> {
        self.request(
            Method::POST,
            "/vg_capacity_policies",
            "CreateCapacityPolicy",
            Some(req),
        )
        .await
    }

    async fn delete_capacity_policy(&self, name: &str) -> Result<()> {
        let policy = self
            .get_capacity_policy(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "capacity_policy".into(),
                name: name.into(),
            })?;
        self.delete(
            &format!("/vg_capacity_policies/{}", policy.id),
            "DeleteCapacityPolicy",
        )
        .await
    }

    // =========================================================================
    // Retention Policies
    // =========================================================================

    async fn get_retention_policies(&self) -> Result<Vec<RetentionPolicy>> {
        self.get_hits("/retention_policies", "GetRetentionPolicies")
            .await
    }

    async fn get_retention_policy(&self, name: &str) -> Result<Option<RetentionPolicy>> {
        let hits: Vec<RetentionPolicy> = self
            .get_hits(
                &by_name_path("retention_policies", name),
                "GetRetentionPolicy",
            )
            .await?;
        Ok(hits.into_iter().find(|p| p.name == name))
    }

    async fn create_retention_policy(
        &self,
        req: &RetentionPolicyCreate,
    ) -> Result<RetentionPolicy> {
        self.request(
            Method::POST,
            "/retention_policies",
            "CreateRetentionPolicy",
            Some(req),
        )
        .await
    }

    async fn update_retention_policy(
        &self,
        name: &str,
        patch: &RetentionPolicyUpdate,
    ) -> Result<RetentionPolicy> {
        let policy = self
            .get_retention_policy(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "retention_policy".into(),
                name: name.into(),
            })?;
        self.request(
            Method::PATCH,
            &format!("/retention_policies/{}", policy.id),
            "UpdateRetentionPolicy",
            Some(patch),
        )
        .await
    }

    async fn delete_retention_policy(&self, name: &str) -> Result<()> {
        let policy = self
            .get_retention_policy(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "retention_policy".into(),
                name: name.into(),
            })?;
        self.delete(
            &format!("/retention_policies/{}", policy.id),
            "DeleteRetentionPolicy",
        )
        .await
    }
}
