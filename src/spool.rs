//! smsd spool files: atomic publication into the outgoing queue and header
//! lookup in the sent directory.
//!
//! ## File format
//!
//! ```text
//! From: <username>
//! Alphabet: UCS        (only for UCS-2 bodies)
//! To: <mobile>
//!
//! <body bytes>
//! ```
//!
//! ## Atomicity
//!
//! A message is written in full to `<prefix><uuid>.LOCK` (created with
//! `O_EXCL`, ignored by smsd), fsynced, chmodded to 0666 and then renamed to
//! `<prefix><uuid>`. smsd never sees a partial file under a final name. The
//! final base name is the message id.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SpoolConfig;
use crate::encoder::EncodedPayload;

/// Suffix smsd skips while scanning the outgoing directory.
const STAGING_SUFFIX: &str = ".LOCK";

/// Mode smsd expects on queued files (it may run as a different user).
const SPOOL_FILE_MODE: u32 = 0o666;

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("spool I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("message not found")]
    NotFound,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SpoolError + '_ {
    move |source| SpoolError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Header fields of a message smsd has moved to the sent directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Sent")]
    pub sent: Option<String>,
    pub message_id: String,
}

/// Writer for the outgoing queue and reader for the sent directory.
#[derive(Debug, Clone)]
pub struct SpoolWriter {
    outgoing_dir: PathBuf,
    sent_dir: PathBuf,
    prefix: String,
}

/// A fully written message that is not yet visible to smsd.
///
/// Dropping it without calling [`StagedMessage::commit`] deletes the temp file.
#[derive(Debug)]
pub struct StagedMessage {
    message_id: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl StagedMessage {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rename the temp file to its final name. Returns the message id.
    pub async fn commit(mut self) -> Result<String, SpoolError> {
        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(io_error(&self.final_path))?;
        self.committed = true;
        Ok(std::mem::take(&mut self.message_id))
    }
}

impl Drop for StagedMessage {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                debug!("spool: could not remove {}: {e}", self.temp_path.display());
            }
        }
    }
}

impl SpoolWriter {
    pub fn new(config: &SpoolConfig) -> Self {
        Self {
            outgoing_dir: config.outgoing_dir.clone(),
            sent_dir: config.sent_dir.clone(),
            prefix: config.prefix.clone(),
        }
    }

    /// Queue one message for one destination. Returns the message id.
    pub async fn write(
        &self,
        sender: &str,
        mobile: &str,
        payload: &EncodedPayload,
    ) -> Result<String, SpoolError> {
        let staged = self.stage(sender, mobile, payload).await?;
        let final_path = staged.final_path.clone();
        let message_id = staged.commit().await?;
        info!(
            "Message from {sender} to {mobile} placed to the spooler {}",
            final_path.display()
        );
        Ok(message_id)
    }

    /// Write the complete spool file under its temporary name.
    pub async fn stage(
        &self,
        sender: &str,
        mobile: &str,
        payload: &EncodedPayload,
    ) -> Result<StagedMessage, SpoolError> {
        let message_id = format!("{}{}", self.prefix, Uuid::new_v4().simple());
        let final_path = self.outgoing_dir.join(&message_id);
        let temp_path = self
            .outgoing_dir
            .join(format!("{message_id}{STAGING_SUFFIX}"));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&temp_path)
            .await
            .map_err(io_error(&temp_path))?;

        // From here on the temp file is cleaned up by Drop on any early return.
        let staged = StagedMessage {
            message_id,
            temp_path,
            final_path,
            committed: false,
        };

        let content = render(sender, mobile, payload);
        file.write_all(&content)
            .await
            .map_err(io_error(&staged.temp_path))?;
        file.sync_all().await.map_err(io_error(&staged.temp_path))?;
        drop(file);

        tokio::fs::set_permissions(
            &staged.temp_path,
            std::fs::Permissions::from_mode(SPOOL_FILE_MODE),
        )
        .await
        .map_err(io_error(&staged.temp_path))?;

        Ok(staged)
    }

    /// Read back the header of a message in the sent directory.
    pub async fn read_sent(&self, message_id: &str) -> Result<SentMessage, SpoolError> {
        if !is_plain_file_name(message_id) {
            return Err(SpoolError::NotFound);
        }
        let path = self.sent_dir.join(message_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SpoolError::NotFound),
            Err(e) => return Err(io_error(&path)(e)),
        };
        Ok(parse_sent_header(message_id, &bytes))
    }
}

/// Serialize a spool file: header, blank line, body.
fn render(sender: &str, mobile: &str, payload: &EncodedPayload) -> Vec<u8> {
    let mut header = format!("From: {sender}\n");
    if let Some(tag) = payload.alphabet.header_tag() {
        header.push_str("Alphabet: ");
        header.push_str(tag);
        header.push('\n');
    }
    header.push_str("To: ");
    header.push_str(mobile);
    header.push_str("\n\n");

    let mut out = header.into_bytes();
    out.extend_from_slice(&payload.bytes);
    out
}

/// Collect `From`, `To` and `Sent` from the header block (up to the first
/// blank line). The body is never decoded.
fn parse_sent_header(message_id: &str, bytes: &[u8]) -> SentMessage {
    let mut msg = SentMessage {
        message_id: message_id.to_string(),
        ..SentMessage::default()
    };

    for raw in bytes.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let slot = match key {
            "From" => &mut msg.from,
            "To" => &mut msg.to,
            "Sent" => &mut msg.sent,
            _ => continue,
        };
        *slot = Some(value.to_string());
    }

    msg
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
