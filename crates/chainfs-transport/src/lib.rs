//! chainfs-transport: the record store chunk chains are written into
//!
//! The store offers only "create a record (optionally with one attachment and
//! a reply reference)" and "read a record by id". There is no listing of
//! records, so chains carry their own index through reply references.
//!
//! - `discord`: Discord REST v10 implementation
//! - `memory`: in-process implementation used by the test suites
//! - `link`: how backlinks are written where replies cannot cross channels

pub mod discord;
pub mod link;
pub mod memory;

pub use discord::DiscordTransport;
pub use memory::MemoryTransport;

use async_trait::async_trait;
use chainfs_core::types::{BlobRef, ChannelId};
use chainfs_core::ChainfsResult;

/// A blob upload request
#[derive(Debug, Clone)]
pub struct BlobUpload<'a> {
    pub channel: &'a ChannelId,
    pub payload: &'a [u8],
    /// Attachment filename, `<index>.enc` for chain chunks
    pub filename: &'a str,
    /// Message text; empty for no text
    pub content: &'a str,
    /// Predecessor in the chain; may live in another channel
    pub reply_to: Option<&'a BlobRef>,
}

/// Attachment metadata of a fetched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub size: u64,
    pub url: String,
}

/// A fetched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: BlobRef,
    pub content: String,
    pub backlink: Option<BlobRef>,
    pub attachment: Option<Attachment>,
}

/// A text channel in the guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub topic: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Create a record carrying `payload` as an attachment.
    async fn upload_blob(&self, upload: BlobUpload<'_>) -> ChainfsResult<BlobRef>;

    /// Create a text-only record.
    async fn post_text(&self, channel: &ChannelId, content: &str) -> ChainfsResult<BlobRef>;

    async fn fetch_record(&self, id: &BlobRef) -> ChainfsResult<Record>;

    async fn download_bytes(&self, url: &str) -> ChainfsResult<Vec<u8>>;

    /// Text channels of the configured guild
    async fn list_channels(&self) -> ChainfsResult<Vec<ChannelInfo>>;

    async fn create_channel(&self, name: &str, topic: &str) -> ChainfsResult<ChannelInfo>;
}
