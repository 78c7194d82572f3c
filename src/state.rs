//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;

use crate::config::Config;
use crate::health::HealthEvaluator;
use crate::lock::DeviceLock;
use crate::modem::ModemChannel;
use crate::outbox::Outbox;
use crate::permissions::PermissionGate;
use crate::reset::ResetGovernor;
use crate::smsd::SmsdMonitor;
use crate::spool::SpoolWriter;

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Validation, permissions and spooling for send requests.
    pub outbox: Arc<Outbox>,
    /// Reads sent-message headers back.
    pub spool: SpoolWriter,
    /// Modem signal/registration check with reset governor.
    pub health: Arc<HealthEvaluator>,
    pub smsd: SmsdMonitor,
}

impl AppState {
    /// Wire every component from config. The modem channel and the reset
    /// governor share one device lock.
    pub fn from_config(config: Config) -> Self {
        let spool = SpoolWriter::new(&config.spool);
        let gate = PermissionGate::new(&config.permissions);
        let lock = DeviceLock::new(config.modem.lock_path());
        let channel = ModemChannel::from_config(&config.modem, lock.clone());
        let governor = ResetGovernor::from_config(&config.modem, lock);

        Self {
            outbox: Arc::new(Outbox::new(gate, spool.clone())),
            spool,
            health: Arc::new(HealthEvaluator::new(channel, governor)),
            smsd: SmsdMonitor::new(&config.smsd.pid_file),
            config: Arc::new(config),
        }
    }
}
