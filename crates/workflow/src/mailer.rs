use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        attachments: &[Attachment],
    ) -> Result<()>;
}

/// Writes each message into an outbox directory instead of delivering it.
///
/// A message becomes `<stamp>/message.json` plus one file per attachment,
/// which a relay (or a test) can pick up.
#[derive(Debug)]
pub struct OutboxMailer {
    dir: PathBuf,
    from: String,
    sequence: AtomicU64,
}

#[derive(Debug, Serialize)]
struct OutboxMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    attachments: Vec<OutboxAttachment<'a>>,
    queued_at: String,
}

#[derive(Debug, Serialize)]
struct OutboxAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    size: usize,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>, from: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            from: from.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn message_dir(&self) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
        self.dir.join(format!("{stamp}-{}-{seq:04}", std::process::id()))
    }
}

fn safe_filename(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name != "message.json"
        && !name.starts_with('.')
        && !name.contains(['/', '\\']);
    if ok {
        Ok(name)
    } else {
        Err(WorkflowError::InvalidRequest(format!(
            "refusing attachment name {name:?}"
        )))
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        if !to.contains('@') {
            return Err(WorkflowError::InvalidRequest(format!(
                "invalid recipient {to:?}"
            )));
        }

        let dir = self.message_dir();
        tokio::fs::create_dir_all(&dir).await?;
        for attachment in attachments {
            let name = safe_filename(&attachment.filename)?;
            tokio::fs::write(dir.join(name), &attachment.bytes).await?;
        }

        let message = OutboxMessage {
            from: &self.from,
            to,
            subject,
            html,
            attachments: attachments
                .iter()
                .map(|a| OutboxAttachment {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    size: a.bytes.len(),
                })
                .collect(),
            queued_at: Utc::now().to_rfc3339(),
        };
        tokio::fs::write(dir.join("message.json"), serde_json::to_vec_pretty(&message)?).await?;

        log::info!("Queued mail to {to}: {subject} ({})", dir.display());
        Ok(())
    }
}
