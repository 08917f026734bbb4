//! Fixed-size segmentation
//!
//! A file is read in blocks of `max_blob_size - IV_SIZE` bytes so that every
//! wire chunk (`iv || ciphertext`) fits in one transport attachment. All
//! blocks are encrypted under one key derived from a fresh salt.

use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_crypto::{derive_key, generate_meta, EncryptedChunk, Salt, IV_SIZE};
use secrecy::SecretString;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// A file held in memory as an ordered list of wire chunks.
///
/// Chunk order is plaintext concatenation order. Built once (by segmenting a
/// source or by walking a chain) and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedFile {
    pub name: String,
    pub salt: Salt,
    /// Each entry is `iv || ciphertext`
    pub chunks: Vec<Vec<u8>>,
}

impl ChunkedFile {
    pub fn meta_token(&self) -> String {
        generate_meta(&self.name, &self.salt)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes on the wire
    pub fn wire_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    /// Total plaintext bytes, assuming every chunk carries a full IV
    pub fn plaintext_len(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| c.len().saturating_sub(IV_SIZE) as u64)
            .sum()
    }
}

/// Plaintext bytes per chunk for a given attachment limit.
pub fn block_size(max_blob_size: usize) -> ChainfsResult<usize> {
    if max_blob_size <= IV_SIZE {
        return Err(ChainfsError::Config(format!(
            "max_blob_size must exceed the {IV_SIZE}-byte IV, got {max_blob_size}"
        )));
    }
    Ok(max_blob_size - IV_SIZE)
}

/// Segment the file at `path`. The chunked file is named after the path's
/// final component.
pub fn segment_file(
    path: &Path,
    passphrase: &SecretString,
    max_blob_size: usize,
) -> ChainfsResult<ChunkedFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ChainfsError::Config(format!("not a file path: {}", path.display())))?;

    let file = File::open(path)?;
    segment_reader(BufReader::new(file), &name, passphrase, max_blob_size)
}

/// Segment an arbitrary reader.
///
/// An empty source still yields one (empty) chunk so the chain has a head.
pub fn segment_reader<R: Read>(
    mut reader: R,
    name: &str,
    passphrase: &SecretString,
    max_blob_size: usize,
) -> ChainfsResult<ChunkedFile> {
    let block = block_size(max_blob_size)?;
    let (key, salt) = derive_key(passphrase, None)?;

    let mut chunks = Vec::new();
    let mut buf = vec![0u8; block];

    loop {
        let n = fill_block(&mut reader, &mut buf)?;
        if n == 0 && !chunks.is_empty() {
            break;
        }

        let chunk = EncryptedChunk::seal(&buf[..n], &key)?;
        chunks.push(chunk.to_wire());
        debug!(name, index = chunks.len() - 1, bytes = n, "segmented chunk");

        if n < block {
            break;
        }
    }

    Ok(ChunkedFile {
        name: name.to_string(),
        salt,
        chunks,
    })
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
