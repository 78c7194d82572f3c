//! Serialized AT command access to the modem's serial port.
//!
//! Each query takes the [`DeviceLock`], opens the device, writes one command,
//! reads the reply line (skipping an echoed command if the modem has echo on)
//! and a status line, then closes the device and releases the lock. The
//! device is shared with smsd and the reset script, so nothing keeps it open
//! between queries.
//!
//! Failures never escape as errors: a lock timeout or I/O error is logged and
//! reported as [`AtReply::unavailable`].

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::termios::{self, SetArg, SpecialCharacterIndices};
use tracing::{debug, warn};

use crate::config::ModemConfig;
use crate::lock::{DeviceLock, LockError};

pub const SIGNAL_QUALITY_COMMAND: &str = "AT+CSQ";
pub const REGISTRATION_COMMAND: &str = "AT+CREG?";

/// Blank lines tolerated before a reply or status line.
const MAX_BLANK_LINES: usize = 4;

/// Longest line accepted from the modem before it is cut off.
const MAX_LINE_LEN: usize = 512;

/// One line-oriented serial connection.
pub trait AtPort: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to and including `\n`. `None` when the read deadline passes
    /// with nothing received.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Opens a fresh [`AtPort`] for every query.
pub trait PortOpener: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn AtPort>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("couldn't obtain lock for serial device: {0}")]
    Lock(#[from] LockError),
    #[error("unable to read from serial device: {0}")]
    Io(#[from] io::Error),
}

/// Reply to one AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtReply {
    /// Reply line with the echo removed, trimmed.
    pub raw: String,
    /// A completion status line was received.
    pub ok: bool,
}

impl AtReply {
    pub fn unavailable() -> Self {
        Self {
            raw: String::new(),
            ok: false,
        }
    }
}

/// Handle to the modem. Cheap to clone.
#[derive(Clone)]
pub struct ModemChannel {
    lock: DeviceLock,
    lock_timeout: Duration,
    opener: Arc<dyn PortOpener>,
}

impl ModemChannel {
    pub fn new(lock: DeviceLock, lock_timeout: Duration, opener: Arc<dyn PortOpener>) -> Self {
        Self {
            lock,
            lock_timeout,
            opener,
        }
    }

    /// Channel over the configured serial device.
    pub fn from_config(config: &ModemConfig, lock: DeviceLock) -> Self {
        let opener = SerialOpener {
            device: config.device.clone(),
            read_timeout: config.read_timeout(),
        };
        Self::new(lock, config.lock_timeout(), Arc::new(opener))
    }

    pub async fn query_signal_quality(&self) -> AtReply {
        self.query(SIGNAL_QUALITY_COMMAND).await
    }

    pub async fn query_registration(&self) -> AtReply {
        self.query(REGISTRATION_COMMAND).await
    }

    /// Run `command` under the device lock. Never fails; see module docs.
    pub async fn query(&self, command: &'static str) -> AtReply {
        match self.try_query(command).await {
            Ok(reply) => {
                debug!("modem {command}: {:?} ok={}", reply.raw, reply.ok);
                reply
            }
            Err(e) => {
                warn!("modem {command}: {e}");
                AtReply::unavailable()
            }
        }
    }

    async fn try_query(&self, command: &'static str) -> Result<AtReply, ChannelError> {
        let guard = self.lock.acquire(self.lock_timeout).await?;
        let opener = Arc::clone(&self.opener);

        // The port is dropped before the guard, so the device is closed
        // before another holder can open it.
        let reply = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut port = opener.open()?;
            exchange(port.as_mut(), command)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(reply)
    }
}

/// Write `command` and read back `(reply, status)`.
fn exchange(port: &mut dyn AtPort, command: &str) -> io::Result<AtReply> {
    port.write_all(format!("{command}\r\n").as_bytes())?;

    let mut reply = next_line(port)?;
    if reply.as_deref().is_some_and(is_echo) {
        reply = next_line(port)?;
    }
    let status = next_line(port)?;

    Ok(AtReply {
        raw: reply.unwrap_or_default(),
        ok: status.is_some(),
    })
}

/// Next non-blank, sanitized line, or `None` on timeout.
fn next_line(port: &mut dyn AtPort) -> io::Result<Option<String>> {
    for _ in 0..=MAX_BLANK_LINES {
        match port.read_line()? {
            None => return Ok(None),
            Some(line) => {
                let clean = sanitize_line(&line);
                if !clean.is_empty() {
                    return Ok(Some(clean));
                }
            }
        }
    }
    Ok(None)
}

/// An echoed command, possibly preceded by stale garbage bytes.
fn is_echo(line: &str) -> bool {
    line.trim_start_matches(|c: char| !c.is_ascii_alphabetic())
        .starts_with("AT")
}

/// Drop NULs, control characters and U+FFFD left over from lossy decoding,
/// then trim.
fn sanitize_line(line: &str) -> String {
    line.chars()
        .filter(|&c| !c.is_control() && c != '\u{FFFD}')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Opens the real serial device.
pub struct SerialOpener {
    device: PathBuf,
    read_timeout: Duration,
}

impl PortOpener for SerialOpener {
    fn open(&self) -> io::Result<Box<dyn AtPort>> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
            .open(&self.device)?;

        // Blocking reads from here on, bounded by VTIME.
        let flags = fcntl::fcntl(file.as_raw_fd(), FcntlArg::F_GETFL)?;
        let mut oflags = OFlag::from_bits_truncate(flags);
        oflags.remove(OFlag::O_NONBLOCK);
        fcntl::fcntl(file.as_raw_fd(), FcntlArg::F_SETFL(oflags))?;

        configure_termios(&file)?;
        termios::tcflush(&file, termios::FlushArg::TCIOFLUSH)?;

        Ok(Box::new(SerialPort {
            file,
            read_timeout: self.read_timeout,
        }))
    }
}

/// Configure termios: raw mode, 115200 baud, 8N1, no flow control.
/// VMIN=0, VTIME=1 → reads return after 100ms of silence.
fn configure_termios(file: &File) -> io::Result<()> {
    let mut tio = termios::tcgetattr(file)?;

    termios::cfmakeraw(&mut tio);
    termios::cfsetispeed(&mut tio, termios::BaudRate::B115200)?;
    termios::cfsetospeed(&mut tio, termios::BaudRate::B115200)?;

    tio.control_flags |= termios::ControlFlags::CLOCAL | termios::ControlFlags::CREAD;
    tio.control_flags &= !termios::ControlFlags::CRTSCTS;

    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;

    termios::tcsetattr(file, SetArg::TCSANOW, &tio)?;
    Ok(())
}

struct SerialPort {
    file: File,
    read_timeout: Duration,
}

impl AtPort for SerialPort {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let deadline = Instant::now() + self.read_timeout;
        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];

        while Instant::now() < deadline && line.len() < MAX_LINE_LEN {
            match self.file.read(&mut byte) {
                // VTIME expired with no data
                Ok(0) => {}
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }

        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&line).into_owned()))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{channel, ScriptedOpener};
    use super::*;

    fn lock(dir: &tempfile::TempDir) -> DeviceLock {
        DeviceLock::new(dir.path().join("LCK..ttyTEST"))
    }

    #[tokio::test]
    async fn test_echo_line_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec![
            "AT+CSQ\r\r\n",
            "+CSQ: 15,99\r\n",
            "\r\n",
            "OK\r\n",
        ]]);
        let reply = channel(lock(&tmp), opener.clone())
            .query_signal_quality()
            .await;
        assert_eq!(
            reply,
            AtReply {
                raw: "+CSQ: 15,99".to_string(),
                ok: true
            }
        );
        assert_eq!(opener.written(), vec!["AT+CSQ\r\n"]);
    }

    #[tokio::test]
    async fn test_reply_without_echo() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec!["+CREG: 0,1\r\n", "OK\r\n"]]);
        let reply = channel(lock(&tmp), opener.clone())
            .query_registration()
            .await;
        assert_eq!(reply.raw, "+CREG: 0,1");
        assert!(reply.ok);
        assert_eq!(opener.written(), vec!["AT+CREG?\r\n"]);
    }

    #[tokio::test]
    async fn test_echo_with_leading_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec!["\u{0}\u{FFFD}AT+CSQ\r\n", "+CSQ: 20,0\r\n", "OK\r\n"]]);
        let reply = channel(lock(&tmp), opener).query_signal_quality().await;
        assert_eq!(reply.raw, "+CSQ: 20,0");
        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_missing_status_line_is_not_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec!["+CSQ: 15,99\r\n"]]);
        let reply = channel(lock(&tmp), opener).query_signal_quality().await;
        assert_eq!(reply.raw, "+CSQ: 15,99");
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_silent_device_is_not_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec![]]);
        let reply = channel(lock(&tmp), opener).query_signal_quality().await;
        assert_eq!(reply, AtReply::unavailable());
    }

    #[tokio::test]
    async fn test_garbage_reply_yields_sentinel_not_fault() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![vec!["\u{7}%%#\u{0}garbage\r\n", "zz\r\n"]]);
        let reply = channel(lock(&tmp), opener).query_signal_quality().await;
        assert_eq!(reply.raw, "%%#garbage");
        assert_eq!(crate::status::parse_signal_quality(&reply.raw).value, 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![]);
        let reply = channel(lock(&tmp), opener).query_signal_quality().await;
        assert_eq!(reply, AtReply::unavailable());
    }

    #[tokio::test]
    async fn test_lock_timeout_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = lock(&tmp);
        let _held = lock.acquire(Duration::from_millis(100)).await.unwrap();

        let opener = ScriptedOpener::new(vec![vec!["+CSQ: 15,99\r\n", "OK\r\n"]]);
        let reply = channel(lock.clone(), opener.clone())
            .query_signal_quality()
            .await;
        assert_eq!(reply, AtReply::unavailable());
        // The device was never touched.
        assert!(opener.written().is_empty());
    }

    #[tokio::test]
    async fn test_lock_released_after_query() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = lock(&tmp);
        let opener = ScriptedOpener::new(vec![vec!["+CSQ: 15,99\r\n", "OK\r\n"]]);
        channel(lock.clone(), opener).query_signal_quality().await;
        assert!(lock.acquire(Duration::from_millis(50)).await.is_ok());
    }

    #[test]
    fn test_is_echo() {
        assert!(is_echo("AT+CSQ"));
        assert!(is_echo("\u{1}AT+CREG?"));
        assert!(!is_echo("+CSQ: 15,99"));
        assert!(!is_echo("OK"));
    }

    #[test]
    fn test_sanitize_line() {
        assert_eq!(sanitize_line("\u{0}+CSQ: 15,99\r\n"), "+CSQ: 15,99");
        assert_eq!(sanitize_line("\r\n"), "");
    }
}
