//! Rate-limited modem reset.
//!
//! A CSQ of 99 usually means the radio is wedged and only a reset recovers
//! it. Health checks can arrive every few seconds, so resets are limited to
//! one per `min_reset_interval_secs`. The time of the last reset is kept in a
//! small text file so the limit survives restarts.
//!
//! The whole read-decide-act-write sequence runs under the modem's
//! [`DeviceLock`], so two gateways sharing the lock file cannot both reset
//! inside one cooldown window.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ModemConfig;
use crate::lock::DeviceLock;

/// Uniquifies temp file names for timestamp writes.
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Something that resets the modem. Must not wait for the reset to finish.
pub trait ResetAction: Send + Sync {
    fn trigger(&self) -> io::Result<()>;
}

/// Spawns the configured reset script and lets it run detached.
pub struct CommandReset {
    command: PathBuf,
}

impl CommandReset {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ResetAction for CommandReset {
    fn trigger(&self) -> io::Result<()> {
        let child = Command::new(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!(
            "reset: spawned {} (pid {:?})",
            self.command.display(),
            child.id()
        );
        Ok(())
    }
}

/// The persisted `last_reset_epoch_seconds` value.
#[derive(Debug, Clone)]
pub struct ResetState {
    path: PathBuf,
}

impl ResetState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last reset time. A missing or unreadable file counts as "never".
    pub async fn load(&self) -> f64 {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0.0,
            Err(e) => {
                warn!("reset: cannot read {}: {e}", self.path.display());
                return 0.0;
            }
        };
        match content.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!(
                    "reset: ignoring corrupt timestamp {:?} in {}",
                    content.trim(),
                    self.path.display()
                );
                0.0
            }
        }
    }

    /// Replace the stored time via temp file + rename.
    pub async fn store(&self, epoch_secs: f64) -> io::Result<()> {
        let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut temp = self.path.as_os_str().to_owned();
        temp.push(format!(".tmp.{}.{seq}", std::process::id()));
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, epoch_secs.to_string()).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }
}

/// What [`ResetGovernor::maybe_reset`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetOutcome {
    /// The reset action was started and the timestamp updated.
    Triggered,
    /// The last reset was too recent.
    CoolingDown { elapsed_secs: f64 },
    /// The device lock could not be taken; nothing was done.
    LockUnavailable,
    /// The action failed to start. The timestamp was still updated.
    ActionFailed,
}

pub struct ResetGovernor {
    lock: DeviceLock,
    lock_timeout: Duration,
    state: ResetState,
    min_interval: Duration,
    action: Arc<dyn ResetAction>,
}

impl ResetGovernor {
    pub fn new(
        lock: DeviceLock,
        lock_timeout: Duration,
        state: ResetState,
        min_interval: Duration,
        action: Arc<dyn ResetAction>,
    ) -> Self {
        Self {
            lock,
            lock_timeout,
            state,
            min_interval,
            action,
        }
    }

    pub fn from_config(config: &ModemConfig, lock: DeviceLock) -> Self {
        Self::new(
            lock,
            config.lock_timeout(),
            ResetState::new(&config.reset_timestamp_path),
            Duration::from_secs(config.min_reset_interval_secs),
            Arc::new(CommandReset::new(&config.reset_command)),
        )
    }

    /// Reset the modem unless one happened within the cooldown window.
    pub async fn maybe_reset(&self) -> ResetOutcome {
        self.maybe_reset_at(now_epoch_secs()).await
    }

    /// [`maybe_reset`](Self::maybe_reset) with an explicit current time.
    pub async fn maybe_reset_at(&self, now: f64) -> ResetOutcome {
        let _guard = match self.lock.acquire(self.lock_timeout).await {
            Ok(g) => g,
            Err(e) => {
                warn!("reset: unable to obtain lock for serial device: {e}");
                return ResetOutcome::LockUnavailable;
            }
        };

        let last = self.state.load().await;
        let elapsed_secs = now - last;
        info!("last modem reset: {last:.0} ({elapsed_secs:.0}s ago)");

        if elapsed_secs <= self.min_interval.as_secs_f64() {
            return ResetOutcome::CoolingDown { elapsed_secs };
        }

        info!("resetting modem...");
        let outcome = match self.action.trigger() {
            Ok(()) => ResetOutcome::Triggered,
            Err(e) => {
                warn!("reset: action failed to start: {e}");
                ResetOutcome::ActionFailed
            }
        };

        if let Err(e) = self.state.store(now).await {
            warn!(
                "reset: could not persist timestamp to {}: {e}",
                self.state.path().display()
            );
        }

        outcome
    }
}

fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Counts triggers; optionally fails to start.
    #[derive(Default)]
    pub struct CountingReset {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingReset {
        pub fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ResetAction for CountingReset {
        fn trigger(&self) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(io::Error::new(io::ErrorKind::NotFound, "no reset script"))
            } else {
                Ok(())
            }
        }
    }

    pub fn governor(
        lock: DeviceLock,
        state_path: &Path,
        action: Arc<CountingReset>,
    ) -> ResetGovernor {
        ResetGovernor::new(
            lock,
            Duration::from_millis(100),
            ResetState::new(state_path),
            Duration::from_secs(300),
            action,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{governor, CountingReset};
    use super::*;

    const NOW: f64 = 1_700_000_000.5;

    struct Fixture {
        _tmp: tempfile::TempDir,
        lock: DeviceLock,
        state_path: PathBuf,
        action: Arc<CountingReset>,
        governor: ResetGovernor,
    }

    fn fixture(action: CountingReset) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let lock = DeviceLock::new(tmp.path().join("LCK..ttyTEST"));
        let state_path = tmp.path().join("modem_last_reset");
        let action = Arc::new(action);
        let governor = governor(lock.clone(), &state_path, Arc::clone(&action));
        Fixture {
            _tmp: tmp,
            lock,
            state_path,
            action,
            governor,
        }
    }

    fn stored(path: &Path) -> f64 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_run_resets() {
        let f = fixture(CountingReset::default());
        assert_eq!(f.governor.maybe_reset_at(NOW).await, ResetOutcome::Triggered);
        assert_eq!(f.action.count(), 1);
        assert!((stored(&f.state_path) - NOW).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_recent_reset_is_noop() {
        let f = fixture(CountingReset::default());
        std::fs::write(&f.state_path, (NOW - 100.0).to_string()).unwrap();

        let outcome = f.governor.maybe_reset_at(NOW).await;
        assert!(matches!(outcome, ResetOutcome::CoolingDown { elapsed_secs } if (elapsed_secs - 100.0).abs() < 1e-6));
        assert_eq!(f.action.count(), 0);
        assert!((stored(&f.state_path) - (NOW - 100.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_stale_reset_triggers_once_and_updates() {
        let f = fixture(CountingReset::default());
        std::fs::write(&f.state_path, (NOW - 400.0).to_string()).unwrap();

        assert_eq!(f.governor.maybe_reset_at(NOW).await, ResetOutcome::Triggered);
        assert_eq!(f.action.count(), 1);
        assert!((stored(&f.state_path) - NOW).abs() < 1e-6);

        // A second degraded reading right after is inside the new window.
        let again = f.governor.maybe_reset_at(NOW + 1.0).await;
        assert!(matches!(again, ResetOutcome::CoolingDown { .. }));
        assert_eq!(f.action.count(), 1);
    }

    #[tokio::test]
    async fn test_exact_interval_is_still_cooling_down() {
        let f = fixture(CountingReset::default());
        std::fs::write(&f.state_path, (NOW - 300.0).to_string()).unwrap();
        assert!(matches!(
            f.governor.maybe_reset_at(NOW).await,
            ResetOutcome::CoolingDown { .. }
        ));
        assert_eq!(f.action.count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_state_counts_as_never() {
        let f = fixture(CountingReset::default());
        std::fs::write(&f.state_path, "not a number\n").unwrap();
        assert_eq!(f.governor.maybe_reset_at(NOW).await, ResetOutcome::Triggered);
        assert_eq!(f.action.count(), 1);
    }

    #[tokio::test]
    async fn test_python_style_timestamp_is_read() {
        let f = fixture(CountingReset::default());
        std::fs::write(&f.state_path, "1700000000.123456").unwrap();
        let state = ResetState::new(&f.state_path);
        assert!((state.load().await - 1_700_000_000.123_456).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_lock_held_skips_reset() {
        let f = fixture(CountingReset::default());
        let _held = f.lock.acquire(Duration::from_millis(100)).await.unwrap();

        assert_eq!(
            f.governor.maybe_reset_at(NOW).await,
            ResetOutcome::LockUnavailable
        );
        assert_eq!(f.action.count(), 0);
        assert!(!f.state_path.exists());
    }

    #[tokio::test]
    async fn test_failed_action_still_starts_cooldown() {
        let f = fixture(CountingReset {
            fail: true,
            ..CountingReset::default()
        });
        assert_eq!(
            f.governor.maybe_reset_at(NOW).await,
            ResetOutcome::ActionFailed
        );
        assert!((stored(&f.state_path) - NOW).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_store_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let state = ResetState::new(tmp.path().join("ts"));
        state.store(12.5).await.unwrap();
        state.store(13.5).await.unwrap();
        let names: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
        assert!((state.load().await - 13.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_command_reset_spawns_detached() {
        let action = CommandReset::new("/bin/true");
        assert!(action.trigger().is_ok());
        assert!(CommandReset::new("/nonexistent/reset_modem.sh").trigger().is_err());
    }
}
