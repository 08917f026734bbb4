//! In-memory transport
//!
//! Behaves like the Discord store: snowflake-ish ids, reply references that
//! must point at an existing message in the same channel, backlinks in the
//! attachment description, an optional attachment size limit.
//!
//! With the `testing` feature it can also be told to fail uploads, fetches or
//! downloads, and stored chains can be tampered with.

use async_trait::async_trait;
use chainfs_core::types::{BlobRef, ChannelId, MessageId};
use chainfs_core::{ChainfsError, ChainfsResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::link::{plan_backlink, resolve_backlink};
use crate::{Attachment, BlobUpload, ChannelInfo, Record, Transport};

const URL_SCHEME: &str = "memory://";

/// A stored message, kept in the shape Discord keeps it
#[derive(Debug, Clone)]
struct Message {
    id: BlobRef,
    content: String,
    reply: Option<BlobRef>,
    attachment: Option<Attachment>,
    /// Description of the attachment
    description: Option<String>,
}

impl Message {
    fn to_record(&self) -> Record {
        Record {
            id: self.id.clone(),
            content: self.content.clone(),
            backlink: resolve_backlink(self.description.as_deref(), self.reply.clone()),
            attachment: self.attachment.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    channels: Vec<ChannelInfo>,
    records: HashMap<BlobRef, Message>,
    blobs: HashMap<String, Vec<u8>>,
    /// Successful uploads before injected failures start
    fail_after: usize,
    /// Remaining injected upload failures
    upload_failures: usize,
    upload_attempts: usize,
    uploads_succeeded: usize,
    /// 1-based upload attempt numbers that fail
    failing_attempts: HashSet<usize>,
    fail_fetch: Option<BlobRef>,
    fail_downloads: bool,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (1_000_000 + self.next_id).to_string()
    }

    fn has_channel(&self, id: &ChannelId) -> bool {
        self.channels.iter().any(|c| &c.id == id)
    }

    fn insert(&mut self, msg: Message) -> ChainfsResult<()> {
        if let Some(target) = &msg.reply {
            if target.channel != msg.id.channel {
                return Err(ChainfsError::Transport(format!(
                    "400 Cannot reply to a message in a different channel: {target}"
                )));
            }
            if !self.records.contains_key(target) {
                return Err(ChainfsError::Transport(format!(
                    "unknown message in reply reference: {target}"
                )));
            }
        }
        self.records.insert(msg.id.clone(), msg);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    max_attachment: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject attachments larger than `limit` bytes.
    pub fn with_max_attachment(limit: usize) -> Self {
        Self {
            max_attachment: Some(limit),
            ..Self::default()
        }
    }

    fn lock(&self) -> ChainfsResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ChainfsError::Transport("memory transport lock poisoned".into()))
    }
}

#[cfg(any(test, feature = "testing"))]
impl MemoryTransport {

    /// After `after` more successful uploads, fail the next `count` attempts.
    pub fn inject_upload_failures(&self, after: usize, count: usize) -> ChainfsResult<()> {
        let mut st = self.lock()?;
        st.fail_after = st.uploads_succeeded + after;
        st.upload_failures = count;
        Ok(())
    }

    /// Fail exactly the listed upload attempts, counted from 1 over the
    /// transport's lifetime.
    pub fn fail_upload_attempts(&self, attempts: &[usize]) -> ChainfsResult<()> {
        self.lock()?.failing_attempts = attempts.iter().copied().collect();
        Ok(())
    }

    /// Make every fetch of `id` fail.
    pub fn fail_fetch_of(&self, id: &BlobRef) -> ChainfsResult<()> {
        self.lock()?.fail_fetch = Some(id.clone());
        Ok(())
    }

    pub fn fail_downloads(&self, fail: bool) -> ChainfsResult<()> {
        self.lock()?.fail_downloads = fail;
        Ok(())
    }

    /// Upload attempts seen so far, failed ones included
    pub fn upload_attempts(&self) -> ChainfsResult<usize> {
        Ok(self.lock()?.upload_attempts)
    }

    /// Records currently stored in `channel`, in creation order
    pub fn records_in(&self, channel: &ChannelId) -> ChainfsResult<Vec<Record>> {
        let st = self.lock()?;
        let mut records: Vec<Record> = st
            .records
            .values()
            .filter(|m| &m.id.channel == channel)
            .map(Message::to_record)
            .collect();
        records.sort_by_key(|r| r.id.message.0.parse::<u64>().unwrap_or(u64::MAX));
        Ok(records)
    }

    /// Overwrite the stored bytes behind an attachment URL.
    pub fn replace_blob(&self, url: &str, bytes: Vec<u8>) -> ChainfsResult<()> {
        let mut st = self.lock()?;
        match st.blobs.get_mut(url) {
            Some(b) => {
                *b = bytes;
                Ok(())
            }
            None => Err(ChainfsError::Transport(format!("no blob at {url}"))),
        }
    }

    /// Rewrite a record's backlink, e.g. to build a corrupt chain.
    pub fn set_backlink(&self, id: &BlobRef, backlink: Option<BlobRef>) -> ChainfsResult<()> {
        let mut st = self.lock()?;
        let msg = st
            .records
            .get_mut(id)
            .ok_or_else(|| ChainfsError::Transport(format!("unknown message {id}")))?;
        msg.reply = None;
        msg.description = backlink.map(|b| format!("{}{b}", crate::link::BACKLINK_PREFIX));
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn upload_blob(&self, upload: BlobUpload<'_>) -> ChainfsResult<BlobRef> {
        let mut st = self.lock()?;
        st.upload_attempts += 1;

        let attempt = st.upload_attempts;
        if st.failing_attempts.remove(&attempt) {
            return Err(ChainfsError::Transport(format!(
                "injected failure on attempt {attempt}: 502 Bad Gateway"
            )));
        }
        if st.upload_failures > 0 && st.uploads_succeeded >= st.fail_after {
            st.upload_failures -= 1;
            return Err(ChainfsError::Transport(
                "injected failure: 503 Service Unavailable".into(),
            ));
        }
        if !st.has_channel(upload.channel) {
            return Err(ChainfsError::Transport(format!(
                "unknown channel {}",
                upload.channel
            )));
        }
        if let Some(limit) = self.max_attachment {
            if upload.payload.len() > limit {
                return Err(ChainfsError::Transport(format!(
                    "413 Payload Too Large: {} > {limit}",
                    upload.payload.len()
                )));
            }
        }
        if let Some(target) = upload.reply_to {
            if !st.records.contains_key(target) {
                return Err(ChainfsError::Transport(format!(
                    "unknown message in reply reference: {target}"
                )));
            }
        }

        let link = plan_backlink(upload.channel, upload.reply_to);
        let message = st.next_id();
        let id = BlobRef {
            channel: upload.channel.clone(),
            message: MessageId(message),
        };
        let url = format!("{URL_SCHEME}{}/{}", id, upload.filename);

        st.insert(Message {
            id: id.clone(),
            content: upload.content.to_string(),
            reply: link.reply.cloned(),
            attachment: Some(Attachment {
                filename: upload.filename.to_string(),
                size: upload.payload.len() as u64,
                url: url.clone(),
            }),
            description: link.description,
        })?;
        st.blobs.insert(url, upload.payload.to_vec());
        st.uploads_succeeded += 1;
        Ok(id)
    }

    async fn post_text(&self, channel: &ChannelId, content: &str) -> ChainfsResult<BlobRef> {
        let mut st = self.lock()?;
        if !st.has_channel(channel) {
            return Err(ChainfsError::Transport(format!("unknown channel {channel}")));
        }
        let id = BlobRef {
            channel: channel.clone(),
            message: MessageId(st.next_id()),
        };
        st.insert(Message {
            id: id.clone(),
            content: content.to_string(),
            reply: None,
            attachment: None,
            description: None,
        })?;
        Ok(id)
    }

    async fn fetch_record(&self, id: &BlobRef) -> ChainfsResult<Record> {
        let st = self.lock()?;
        if st.fail_fetch.as_ref() == Some(id) {
            return Err(ChainfsError::Transport(format!(
                "injected failure fetching {id}"
            )));
        }
        st.records
            .get(id)
            .map(Message::to_record)
            .ok_or_else(|| ChainfsError::Transport(format!("404 Unknown Message: {id}")))
    }

    async fn download_bytes(&self, url: &str) -> ChainfsResult<Vec<u8>> {
        let st = self.lock()?;
        if st.fail_downloads {
            return Err(ChainfsError::Transport(
                "failed to download chunk: status 500".into(),
            ));
        }
        st.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| ChainfsError::Transport(format!("failed to download chunk: 404 {url}")))
    }

    async fn list_channels(&self) -> ChainfsResult<Vec<ChannelInfo>> {
        Ok(self.lock()?.channels.clone())
    }

    async fn create_channel(&self, name: &str, topic: &str) -> ChainfsResult<ChannelInfo> {
        let mut st = self.lock()?;
        let channel = ChannelInfo {
            id: ChannelId(st.next_id()),
            name: name.to_string(),
            topic: Some(topic.to_string()),
        };
        st.channels.push(channel.clone());
        Ok(channel)
    }
}
