//! File-level operations: what the command layer calls
//!
//! - `upload_file`: segment → encrypt → chained upload → locator
//! - `download_file`: walk chain → decrypt → write output

use chainfs_chunks::{reconstruct_to_path, segment_file};
use chainfs_core::types::Locator;
use chainfs_core::{ChainfsError, ChainfsResult};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::retrieve::fetch_chain;
use crate::session::Session;
use crate::upload::{upload_chain, UploadResult};
use crate::ProgressFn;

/// Result of downloading a single file
#[derive(Debug)]
pub struct DownloadResult {
    /// Name recorded in the chain's meta token
    pub name: String,
    pub local_path: PathBuf,
    pub chunks: usize,
    pub bytes: u64,
}

/// Encrypt and upload the file at `path`. Returns the upload summary; its
/// `locator` is the value to share.
pub async fn upload_file(
    session: &Session,
    path: &Path,
    progress: Option<&ProgressFn>,
) -> ChainfsResult<UploadResult> {
    let owned_path = path.to_path_buf();
    let passphrase = session.passphrase().clone();
    let max_blob = session.settings().max_blob_size;

    let file = tokio::task::spawn_blocking(move || segment_file(&owned_path, &passphrase, max_blob))
        .await
        .map_err(|e| ChainfsError::Other(anyhow::anyhow!("segmentation task failed: {e}")))??;

    info!(name = %file.name, chunks = file.len(), "chunked file");

    let result = upload_chain(session, &file, progress).await?;
    session.history().push(Locator::from(result.locator.clone()));
    Ok(result)
}

/// Fetch the chain at `locator` and write the decrypted file.
///
/// Without `output`, the file lands in the current directory as
/// `<name>.dec`, using only the final component of the recorded name.
pub async fn download_file(
    session: &Session,
    locator: &Locator,
    output: Option<&Path>,
    progress: Option<&ProgressFn>,
) -> ChainfsResult<DownloadResult> {
    let fetched = fetch_chain(session, locator, progress).await?;
    let name = fetched.file.name.clone();
    let chunks = fetched.file.len();

    let local_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output_path(&name),
    };

    info!(name = %name, output = %local_path.display(), "decrypting and reconstructing file");

    let passphrase = session.passphrase().clone();
    let target = local_path.clone();
    let file = fetched.file;
    let bytes = tokio::task::spawn_blocking(move || reconstruct_to_path(&file, &passphrase, &target))
        .await
        .map_err(|e| ChainfsError::Other(anyhow::anyhow!("reconstruction task failed: {e}")))??;

    session.history().push(locator.clone());

    Ok(DownloadResult {
        name,
        local_path,
        chunks,
        bytes,
    })
}

/// `<name>.dec`, stripped of any directory parts the uploader recorded.
pub fn default_output_path(name: &str) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string());
    PathBuf::from(format!("{base}.dec"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_strips_directories() {
        assert_eq!(default_output_path("notes.txt"), PathBuf::from("notes.txt.dec"));
        assert_eq!(default_output_path("../../etc/passwd"), PathBuf::from("passwd.dec"));
        assert_eq!(default_output_path("/abs/path/a.bin"), PathBuf::from("a.bin.dec"));
        assert_eq!(default_output_path(""), PathBuf::from("download.dec"));
        assert_eq!(default_output_path(".."), PathBuf::from("download.dec"));
    }
}
