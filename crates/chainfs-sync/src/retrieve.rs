//! Chain retrieval
//!
//! Walk from the locator (tail) through backlinks to the head,
//! downloading every attachment, then reverse. The head's text is the meta
//! token that names the file and carries its salt.
//!
//! There is no retry here: the first failed fetch or download ends the walk.

use chainfs_chunks::ChunkedFile;
use chainfs_core::types::{BlobRef, ChainLink, Locator};
use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_crypto::parse_meta;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::ProgressFn;

/// A fully downloaded chain
#[derive(Debug, Clone)]
pub struct FetchedChain {
    /// Chunks in original write order
    pub file: ChunkedFile,
    /// Head first
    pub links: Vec<ChainLink>,
    pub locator: BlobRef,
}

/// Parse the `<index>.enc` attachment name. Only used for progress display.
pub fn sequence_hint(filename: &str) -> Option<usize> {
    let stem = filename.split('.').next().unwrap_or_default();
    match stem.parse::<usize>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(filename, error = %e, "error parsing chunk number");
            None
        }
    }
}

/// Download the chain ending at `locator`.
pub async fn fetch_chain(
    session: &Session,
    locator: &Locator,
    progress: Option<&ProgressFn>,
) -> ChainfsResult<FetchedChain> {
    let tail = locator.resolve(session.topology().first_data_channel()?);
    let max_len = session.settings().max_chain_length;
    let transport = session.transport();

    let mut blobs: Vec<Vec<u8>> = Vec::new();
    let mut links: Vec<ChainLink> = Vec::new();
    let mut visited: HashSet<BlobRef> = HashSet::new();
    let mut inferred_total: Option<u64> = None;

    let mut current = tail.clone();
    let meta_token = loop {
        if blobs.len() >= max_len {
            return Err(ChainfsError::Format(format!(
                "chain from {tail} exceeds {max_len} records"
            )));
        }
        if !visited.insert(current.clone()) {
            return Err(ChainfsError::Format(format!(
                "chain from {tail} loops back to {current}"
            )));
        }

        let record = transport.fetch_record(&current).await?;
        let attachment = record.attachment.as_ref().ok_or_else(|| {
            ChainfsError::Format(format!("record {current} has no attachment"))
        })?;

        let hint = sequence_hint(&attachment.filename);
        if inferred_total.is_none() {
            inferred_total = hint.map(|n| n as u64 + 1);
            info!(reference = %tail, chunks = ?inferred_total, "starting download");
        }

        let data = transport.download_bytes(&attachment.url).await?;
        debug!(
            reference = %current,
            index = ?hint,
            size = attachment.size,
            got = data.len(),
            "downloaded chunk"
        );
        blobs.push(data);

        if let Some(cb) = progress {
            let done = blobs.len() as u64;
            let total = inferred_total.unwrap_or(0).max(done);
            let label = hint.map_or_else(|| "?".to_string(), |n| (n + 1).to_string());
            cb(done, total, &format!("{tail}: chunk {label}"));
        }

        links.push(ChainLink {
            blob: record.id.clone(),
            predecessor: record.backlink.clone(),
        });

        match record.backlink {
            Some(prev) => current = prev,
            None => break record.content,
        }
    };

    blobs.reverse();
    links.reverse();

    let meta = parse_meta(&meta_token);
    let salt = meta.salt.ok_or_else(|| {
        ChainfsError::Format(format!("chain head of {tail} carries no usable meta token"))
    })?;

    info!(name = %meta.name, chunks = blobs.len(), "fetched file");

    Ok(FetchedChain {
        file: ChunkedFile {
            name: meta.name,
            salt,
            chunks: blobs,
        },
        links,
        locator: tail,
    })
}
