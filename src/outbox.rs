//! Per-request send orchestration.
//!
//! Each destination is validated, checked against the sender's allow-list and
//! spooled on its own. The report carries one entry per destination: a
//! message id on success, otherwise a marker string. A failing destination
//! never affects its siblings.

use std::collections::{BTreeMap, HashSet};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::encoder::{encode, EncodedPayload};
use crate::permissions::{validate_mobile, Permission, PermissionGate};
use crate::spool::SpoolWriter;

pub const NOT_VALID: &str = "Not valid";
pub const FORBIDDEN: &str = "Forbidden";
pub const DENIED: &str = "Denied";
pub const SPOOL_ERROR: &str = "Spool error";

/// Response body for both send endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    /// Destination → message id or marker.
    pub message_id: BTreeMap<String, String>,
    pub sent_text: String,
    pub parts_count: usize,
}

pub struct Outbox {
    gate: PermissionGate,
    spool: SpoolWriter,
}

impl Outbox {
    pub fn new(gate: PermissionGate, spool: SpoolWriter) -> Self {
        Self { gate, spool }
    }

    /// Spool `text` from `identity` to every destination in `mobiles`.
    /// Repeated destinations are sent once.
    pub async fn submit(&self, identity: &str, mobiles: &[String], text: &str) -> SendReport {
        let payload = encode(text);

        let mut seen = HashSet::new();
        let targets: Vec<&str> = mobiles
            .iter()
            .map(String::as_str)
            .filter(|m| seen.insert(*m))
            .collect();

        let outcomes = join_all(
            targets
                .iter()
                .map(|mobile| self.deliver(identity, mobile, &payload)),
        )
        .await;

        SendReport {
            message_id: targets
                .into_iter()
                .map(String::from)
                .zip(outcomes)
                .collect(),
            sent_text: text.to_string(),
            parts_count: payload.segment_count,
        }
    }

    async fn deliver(&self, identity: &str, mobile: &str, payload: &EncodedPayload) -> String {
        if !validate_mobile(mobile) {
            info!("Mobile phone {mobile:?} is not valid [{identity}]");
            return NOT_VALID.to_string();
        }

        match self.gate.check(identity, mobile) {
            Permission::Allowed => {}
            Permission::Forbidden => {
                info!("Forbidden to send message from {identity} to {mobile}");
                return FORBIDDEN.to_string();
            }
            Permission::Denied => {
                info!("Denied sending message from {identity} to {mobile}");
                return DENIED.to_string();
            }
        }

        match self.spool.write(identity, mobile, payload).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to spool message from {identity} to {mobile}: {e}");
                SPOOL_ERROR.to_string()
            }
        }
    }
}
