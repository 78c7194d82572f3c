//! Destination validation and per-user allow-lists.

use std::collections::{HashMap, HashSet};

/// Outcome of checking a caller against a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// No allow-list applies, or the destination is on it.
    Allowed,
    /// Reserved for policy checks beyond the allow-list. Not produced today.
    Denied,
    /// The caller has an allow-list and the destination is not on it.
    Forbidden,
}

/// `true` if `mobile` is a non-empty string of ASCII digits.
pub fn validate_mobile(mobile: &str) -> bool {
    !mobile.is_empty() && mobile.bytes().all(|b| b.is_ascii_digit())
}

/// Allow-lists keyed by username, built once from config.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    allow: HashMap<String, HashSet<String>>,
}

impl PermissionGate {
    pub fn new(lists: &HashMap<String, Vec<String>>) -> Self {
        let allow = lists
            .iter()
            .map(|(user, mobiles)| (user.clone(), mobiles.iter().cloned().collect()))
            .collect();
        Self { allow }
    }

    /// Decide whether `identity` may send to `mobile`.
    pub fn check(&self, identity: &str, mobile: &str) -> Permission {
        match self.allow.get(identity) {
            None => Permission::Allowed,
            Some(list) if list.contains(mobile) => Permission::Allowed,
            Some(_) => Permission::Forbidden,
        }
    }
}
