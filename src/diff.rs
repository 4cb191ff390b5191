//! Membership diffing for list-valued relation attributes
//!
//! Every one-to-many relation managed by the reconciler (PWWNs attached to a
//! host, hosts in a host group, host and host group mappings on a volume or
//! volume group) is reconciled through the single utility in this module:
//! given the previously recorded membership and the newly declared membership,
//! compute which identifiers to attach and which to detach so that the live
//! relation matches the declaration without touching unchanged members.

use std::collections::BTreeSet;

/// The attach/detach edit script for one relation.
///
/// `to_add` and `to_remove` are disjoint by construction. `BTreeSet` keeps
/// both sides in lexicographic order, which is also the order the state file
/// persists relation lists in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Identifiers declared but not currently recorded
    pub to_add: BTreeSet<String>,
    /// Identifiers recorded but no longer declared
    pub to_remove: BTreeSet<String>,
}

impl MembershipDiff {
    /// True when applying the diff would issue at least one remote call
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of attach/detach operations this diff implies
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compute the attach/detach script turning `current` membership into
/// `desired` membership.
///
/// Both inputs are treated as sets: ordering carries no meaning and duplicate
/// entries are ignored. Every identifier in the union of the two inputs is
/// classified by membership on each side; identifiers present on both sides
/// are left alone. A length comparison between the two lists is never a
/// substitute for this scan, since an update can add and remove the same
/// number of members at once.
pub fn membership_diff(current: &[String], desired: &[String]) -> MembershipDiff {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();

    let mut diff = MembershipDiff::default();
    for member in current.union(&desired) {
        match (current.contains(member), desired.contains(member)) {
            (false, true) => {
                diff.to_add.insert((*member).to_string());
            }
            (true, false) => {
                diff.to_remove.insert((*member).to_string());
            }
            _ => {}
        }
    }

    diff
}
