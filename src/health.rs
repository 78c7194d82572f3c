//! Modem health verdict: signal, then registration.

use tracing::warn;

use crate::modem::ModemChannel;
use crate::reset::ResetGovernor;
use crate::status::{parse_registration, parse_signal_quality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HealthError {
    #[error("modem not available")]
    ModemUnavailable,
    #[error("modem not connected or weak signal")]
    WeakSignal,
    #[error("registration problem")]
    RegistrationProblem,
}

pub struct HealthEvaluator {
    channel: ModemChannel,
    governor: ResetGovernor,
}

impl HealthEvaluator {
    pub fn new(channel: ModemChannel, governor: ResetGovernor) -> Self {
        Self { channel, governor }
    }

    /// `Ok(())` when the modem has usable signal and is registered.
    ///
    /// A CSQ of exactly 99 also asks the [`ResetGovernor`] for a reset; the
    /// outcome of that does not change the verdict.
    pub async fn evaluate(&self) -> Result<(), HealthError> {
        let reply = self.channel.query_signal_quality().await;
        if !reply.ok {
            return Err(HealthError::ModemUnavailable);
        }

        let signal = parse_signal_quality(&reply.raw);
        if !signal.is_usable() {
            warn!("CSQ result: {:?}", signal.raw);
            if signal.is_unmeasurable() {
                let outcome = self.governor.maybe_reset().await;
                warn!("CSQ 99, reset governor: {outcome:?}");
            }
            return Err(HealthError::WeakSignal);
        }

        let reply = self.channel.query_registration().await;
        if !reply.ok {
            return Err(HealthError::ModemUnavailable);
        }

        let registration = parse_registration(&reply.raw);
        if !registration.is_registered() {
            warn!("CREG result: {:?}", registration.raw);
            return Err(HealthError::RegistrationProblem);
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::lock::DeviceLock;
    use crate::modem::testing::{channel, ScriptedOpener};
    use crate::reset::testing::{governor, CountingReset};

    /// Evaluator over a scripted modem in `dir`.
    pub fn evaluator(
        dir: &Path,
        opener: Arc<ScriptedOpener>,
        reset: Arc<CountingReset>,
    ) -> HealthEvaluator {
        let lock = DeviceLock::new(dir.join("LCK..ttyTEST"));
        HealthEvaluator::new(
            channel(lock.clone(), opener),
            governor(lock, &dir.join("modem_last_reset"), reset),
        )
    }
}
