//! Chained upload
//!
//! Chunk *n* links back to chunk *n-1*, so chunk *n+1* cannot be sent before
//! chunk *n*'s id is known: uploads are strictly sequential. Chunk 0 carries
//! the meta token as its text. Once the tail is up, `<metaToken>\n<tail>` is
//! posted to the manifest channel.
//!
//! A chunk that keeps failing aborts the upload. Chunks already sent stay on
//! the transport as an orphaned partial chain.

use chainfs_chunks::ChunkedFile;
use chainfs_core::types::{BlobRef, ChainLink, ManifestEntry};
use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_transport::BlobUpload;
use tracing::{debug, error, info};

use crate::retry::with_retry;
use crate::session::Session;
use crate::ProgressFn;

/// Result of uploading one chunked file
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub name: String,
    /// Tail of the chain; the shareable locator
    pub locator: BlobRef,
    /// Manifest record that points at `locator`
    pub manifest: BlobRef,
    pub chunks: usize,
    /// Bytes sent as attachments
    pub bytes: u64,
    /// Head first
    pub links: Vec<ChainLink>,
}

/// Attachment filename for the chunk at `index`
pub fn chunk_filename(index: usize) -> String {
    format!("{index}.enc")
}

/// Upload `file` as a chain and publish its manifest entry.
pub async fn upload_chain(
    session: &Session,
    file: &ChunkedFile,
    progress: Option<&ProgressFn>,
) -> ChainfsResult<UploadResult> {
    if file.is_empty() {
        return Err(ChainfsError::Format(format!(
            "{}: nothing to upload (no chunks)",
            file.name
        )));
    }

    let meta_token = file.meta_token();
    let policy = &session.settings().retry;
    let total = file.len();
    let total_bytes = file.wire_len();

    let mut links: Vec<ChainLink> = Vec::with_capacity(total);
    let mut previous: Option<BlobRef> = None;

    for (index, payload) in file.chunks.iter().enumerate() {
        let channel = session.topology().data_channel_for(index)?;
        let filename = chunk_filename(index);
        let content = if index == 0 { meta_token.as_str() } else { "" };

        let blob = with_retry(policy, &format!("sending chunk {index}"), |attempt| {
            debug!(name = %file.name, index, attempt, %channel, "sending chunk");
            session.transport().upload_blob(BlobUpload {
                channel,
                payload,
                filename: &filename,
                content,
                reply_to: previous.as_ref(),
            })
        })
        .await
        .map_err(|e| {
            error!(
                name = %file.name,
                index,
                orphaned = links.len(),
                error = %e,
                "aborting upload"
            );
            e
        })?;

        links.push(ChainLink {
            blob: blob.clone(),
            predecessor: previous.take(),
        });
        previous = Some(blob);

        if let Some(cb) = progress {
            cb(
                (index + 1) as u64,
                total as u64,
                &format!("{}: chunk {}/{total} ({total_bytes} bytes)", file.name, index + 1),
            );
        }
    }

    let tail = previous.ok_or_else(|| ChainfsError::Format("chain has no tail".into()))?;
    let entry = ManifestEntry {
        meta_token,
        tail: tail.clone(),
    };
    let text = entry.to_text();
    let manifest_channel = &session.topology().manifest;
    let manifest = with_retry(policy, "sending manifest", |_| {
        session.transport().post_text(manifest_channel, &text)
    })
    .await?;

    info!(name = %file.name, reference = %tail, chunks = total, bytes = total_bytes, "sent file");

    Ok(UploadResult {
        name: file.name.clone(),
        locator: tail,
        manifest,
        chunks: total,
        bytes: total_bytes,
        links,
    })
}
