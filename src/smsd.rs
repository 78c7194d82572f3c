//! smsd liveness via its PID file.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum SmsdError {
    #[error("smsd pid file {} unreadable: {source}", path.display())]
    PidFile { path: PathBuf, source: io::Error },
    #[error("smsd pid file {} holds no valid pid", path.display())]
    BadPid { path: PathBuf },
    #[error("smsd not running!")]
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct SmsdMonitor {
    pid_file: PathBuf,
}

impl SmsdMonitor {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
        }
    }

    /// Returns the running smsd's pid.
    pub async fn check(&self) -> Result<i32, SmsdError> {
        let content = tokio::fs::read_to_string(&self.pid_file)
            .await
            .map_err(|source| SmsdError::PidFile {
                path: self.pid_file.clone(),
                source,
            })?;

        // 0 and negative values would address process groups.
        let pid = match content.trim().parse::<i32>() {
            Ok(p) if p > 0 => p,
            _ => {
                return Err(SmsdError::BadPid {
                    path: self.pid_file.clone(),
                })
            }
        };

        // Signal 0 only checks that the process exists. EPERM means it does,
        // just owned by another user.
        match signal::kill(Pid::from_raw(pid), None) {
            Ok(()) | Err(Errno::EPERM) => Ok(pid),
            Err(_) => Err(SmsdError::NotRunning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_with(content: &str) -> (tempfile::TempDir, SmsdMonitor) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("smsd.pid");
        std::fs::write(&path, content).unwrap();
        (tmp, SmsdMonitor::new(path))
    }

    #[tokio::test]
    async fn test_running_process() {
        let own = std::process::id();
        let (_tmp, monitor) = monitor_with(&format!("{own}\n"));
        assert_eq!(monitor.check().await.unwrap(), i32::try_from(own).unwrap());
    }

    #[tokio::test]
    async fn test_dead_process() {
        // Above any kernel pid_max.
        let (_tmp, monitor) = monitor_with("2147483000");
        assert!(matches!(monitor.check().await, Err(SmsdError::NotRunning)));
    }

    #[tokio::test]
    async fn test_missing_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let monitor = SmsdMonitor::new(tmp.path().join("absent.pid"));
        assert!(matches!(monitor.check().await, Err(SmsdError::PidFile { .. })));
    }

    #[tokio::test]
    async fn test_garbage_and_group_pids_rejected() {
        for content in ["", "smsd", "0", "-1"] {
            let (_tmp, monitor) = monitor_with(content);
            assert!(
                matches!(monitor.check().await, Err(SmsdError::BadPid { .. })),
                "{content:?}"
            );
        }
    }

    #[test]
    fn test_not_running_message() {
        assert_eq!(SmsdError::NotRunning.to_string(), "smsd not running!");
    }
}
