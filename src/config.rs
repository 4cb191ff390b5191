//! Runtime settings
//!
//! Connection settings come from CLI flags with `SILK_SDP_*` environment
//! fallbacks, the same variables the array's other tooling reads. Validation
//! happens once at startup, before any file or network access.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sdp::SdpClientConfig;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// IP address or hostname of the SDP server
    pub server: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Accept self-signed certificates on the management port
    pub accept_invalid_certs: bool,
    /// Path to the YAML manifest
    pub manifest_path: PathBuf,
    /// Path to the JSON state file
    pub state_path: PathBuf,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(Error::Configuration(
                "SDP server is not set (use --server or SILK_SDP_SERVER)".into(),
            ));
        }
        if self.username.is_empty() {
            return Err(Error::Configuration(
                "SDP username is not set (use --username or SILK_SDP_USERNAME)".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(Error::Configuration(
                "SDP password is not set (use --password or SILK_SDP_PASSWORD)".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("timeout must be at least 1 second".into()));
        }
        Ok(())
    }

    /// Connection settings for the HTTPS client
    pub fn client_config(&self) -> SdpClientConfig {
        SdpClientConfig {
            server: self.server.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_invalid_certs: false,
            manifest_path: PathBuf::from("silk.yaml"),
            state_path: PathBuf::from("silk.state.json"),
        }
    }
}
