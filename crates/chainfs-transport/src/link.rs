//! Chain backlinks on a store whose replies stay inside one channel
//!
//! A reply reference may only point at a message in the same channel, but
//! consecutive chunks live in different data channels. The backlink therefore
//! always travels in the attachment description as
//! `chainfs-prev:<channel>/<message>`; a native reply is added only when the
//! predecessor shares the channel.

use chainfs_core::types::{BlobRef, ChannelId, Locator};

pub const BACKLINK_PREFIX: &str = "chainfs-prev:";

/// How one backlink is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan<'a> {
    /// Native reply reference; same channel only
    pub reply: Option<&'a BlobRef>,
    /// Attachment description carrying the backlink
    pub description: Option<String>,
}

pub fn plan_backlink<'a>(channel: &ChannelId, reply_to: Option<&'a BlobRef>) -> LinkPlan<'a> {
    match reply_to {
        None => LinkPlan {
            reply: None,
            description: None,
        },
        Some(prev) => LinkPlan {
            reply: (&prev.channel == channel).then_some(prev),
            description: Some(format!("{BACKLINK_PREFIX}{prev}")),
        },
    }
}

/// Backlink stored in an attachment description. Anything else is ignored.
pub fn parse_backlink(description: &str) -> Option<BlobRef> {
    let rest = description.strip_prefix(BACKLINK_PREFIX)?;
    match rest.parse::<Locator>() {
        Ok(Locator::Qualified(r)) => Some(r),
        _ => None,
    }
}

/// The description wins over the native reply.
pub fn resolve_backlink(description: Option<&str>, reply: Option<BlobRef>) -> Option<BlobRef> {
    description.and_then(parse_backlink).or(reply)
}
