use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ChainfsError, ChainfsResult};

/// Discord snowflake of a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Discord snowflake of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a single record on the transport.
///
/// Chunks of one chain are spread across several data channels, so the
/// message id alone is not enough to fetch a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

impl BlobRef {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: ChannelId(channel.into()),
            message: MessageId(message.into()),
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.message)
    }
}

/// A chain's tail address, as handed to users.
///
/// Text form is `<channel>/<message>`. A bare `<message>` is accepted as well
/// and resolved against the first data channel at retrieval time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Qualified(BlobRef),
    Bare(MessageId),
}

impl Locator {
    /// Resolve to a concrete record address, using `fallback` for bare ids.
    pub fn resolve(&self, fallback: &ChannelId) -> BlobRef {
        match self {
            Locator::Qualified(r) => r.clone(),
            Locator::Bare(m) => BlobRef {
                channel: fallback.clone(),
                message: m.clone(),
            },
        }
    }
}

impl From<BlobRef> for Locator {
    fn from(r: BlobRef) -> Self {
        Locator::Qualified(r)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Qualified(r) => r.fmt(f),
            Locator::Bare(m) => m.fmt(f),
        }
    }
}

impl FromStr for Locator {
    type Err = ChainfsError;

    fn from_str(s: &str) -> ChainfsResult<Self> {
        let s = s.trim();
        let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric());

        match s.split_once('/') {
            Some((channel, message)) if valid(channel) && valid(message) => {
                Ok(Locator::Qualified(BlobRef::new(channel, message)))
            }
            None if valid(s) => Ok(Locator::Bare(MessageId(s.to_string()))),
            _ => Err(ChainfsError::Format(format!("invalid locator: {s:?}"))),
        }
    }
}

/// One edge of a chain: a blob and the blob it replies to.
///
/// The head of a chain has no predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub blob: BlobRef,
    pub predecessor: Option<BlobRef>,
}

/// The single shareable record for a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub meta_token: String,
    pub tail: BlobRef,
}

impl ManifestEntry {
    /// Manifest record text: `<metaToken>\n<chainTail>`
    pub fn to_text(&self) -> String {
        format!("{}\n{}", self.meta_token, self.tail)
    }

    pub fn from_text(text: &str) -> ChainfsResult<Self> {
        let (meta, tail) = text
            .split_once('\n')
            .ok_or_else(|| ChainfsError::Format("manifest record has no locator line".into()))?;
        let tail = match tail.parse::<Locator>()? {
            Locator::Qualified(r) => r,
            Locator::Bare(_) => {
                return Err(ChainfsError::Format(
                    "manifest locator is missing its channel".into(),
                ))
            }
        };
        Ok(Self {
            meta_token: meta.to_string(),
            tail,
        })
    }
}

/// Channels discovered (or created) at bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopology {
    pub manifest: ChannelId,
    pub data: Vec<ChannelId>,
}

impl ChannelTopology {
    /// Round-robin channel selection for the chunk at `index`.
    pub fn data_channel_for(&self, index: usize) -> ChainfsResult<&ChannelId> {
        if self.data.is_empty() {
            return Err(ChainfsError::Config("no data channels available".into()));
        }
        Ok(&self.data[index % self.data.len()])
    }

    pub fn first_data_channel(&self) -> ChainfsResult<&ChannelId> {
        self.data_channel_for(0)
    }
}
