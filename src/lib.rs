//! Silk SDP Reconciler
//!
//! Declarative management of Silk SDP storage arrays. A YAML manifest
//! declares the desired volumes, volume groups, hosts, host groups and
//! policies; the reconciler compares it against a recorded state file and the
//! live array, then converges the array through the SDP REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Plan/Apply Engine                     │
//! │   manifest (desired)  ──┐                                    │
//! │   state file (recorded) ┼──► diff ──► create/update/delete   │
//! │   live array (refresh) ─┘                                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     Per-Resource Reconcilers                 │
//! │   volume │ volume_group │ host │ host_group │ policies       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                      SdpApi (port trait)                     │
//! │        SdpClient (HTTPS)        │      FakeSdp (tests)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Relation lists (PWWNs, host mappings, group membership) are all
//! reconciled through one utility, [`diff::membership_diff`], so every call
//! site shares the same semantics: unordered set difference, detaches before
//! attaches.
//!
//! # Modules
//!
//! - [`engine`]: plan, apply, destroy and import
//! - [`resources`]: per-kind reconcilers
//! - [`sdp`]: API types, trait and HTTPS client
//! - [`diff`]: membership diffing
//! - [`manifest`] / [`state`]: desired and recorded sides
//! - [`config`] / [`error`]: settings and error types

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod sdp;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use config::Settings;
pub use diff::{membership_diff, MembershipDiff};
pub use engine::{Action, ApplyReport, Plan, PlannedChange};
pub use error::{Error, Result};
pub use manifest::Manifest;
pub use resources::Kind;
pub use sdp::{SdpApi, SdpClient, SdpClientConfig};
pub use state::{Record, State};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
