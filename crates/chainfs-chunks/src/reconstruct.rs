//! Reconstruction: decrypt a chunk sequence back into the original bytes

use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_crypto::{derive_key, EncryptedChunk};
use secrecy::SecretString;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::segment::ChunkedFile;

/// Decrypt every chunk in order and write the plaintext to `sink`.
///
/// Returns the number of plaintext bytes written. A chunk shorter than the IV
/// aborts with a format error.
pub fn reconstruct<W: Write>(
    file: &ChunkedFile,
    passphrase: &SecretString,
    sink: &mut W,
) -> ChainfsResult<u64> {
    let (key, _) = derive_key(passphrase, Some(file.salt))?;

    let mut written = 0u64;
    for (i, wire) in file.chunks.iter().enumerate() {
        let chunk = EncryptedChunk::from_wire(wire)
            .map_err(|e| ChainfsError::Format(format!("chunk {i}: {e}")))?;
        let plaintext = chunk.open(&key)?;
        sink.write_all(&plaintext)?;
        written += plaintext.len() as u64;
        debug!(index = i, bytes = plaintext.len(), "decrypted chunk");
    }
    sink.flush()?;

    Ok(written)
}

/// Reconstruct into `output`, via a temporary sibling that is renamed into
/// place only after every chunk decrypted.
pub fn reconstruct_to_path(
    file: &ChunkedFile,
    passphrase: &SecretString,
    output: &Path,
) -> ChainfsResult<u64> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(output);
    let result = File::create(&tmp)
        .map_err(ChainfsError::from)
        .and_then(|f| {
            let mut writer = BufWriter::new(f);
            reconstruct(file, passphrase, &mut writer)
        })
        .and_then(|bytes| {
            std::fs::rename(&tmp, output)?;
            Ok(bytes)
        });

    match result {
        Ok(bytes) => {
            info!(name = %file.name, output = %output.display(), bytes, "reconstructed");
            Ok(bytes)
        }
        Err(e) => {
            // the temp file may hold decrypted plaintext
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// `<file name>.chainfs_tmp` next to `output`
fn temp_sibling(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".chainfs_tmp");
    output.with_file_name(name)
}
