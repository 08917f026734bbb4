//! Per-chunk AES-256-CFB encryption/decryption
//!
//! Wire chunk format (binary):
//! ```text
//! [16 bytes: random IV][N bytes: ciphertext]
//! ```
//!
//! Every chunk of a file shares the file key; only the IV changes.

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use chainfs_core::{ChainfsError, ChainfsResult};
use rand::RngCore;

use crate::kdf::FileKey;
use crate::IV_SIZE;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt one plaintext block under `key` with a freshly drawn IV.
///
/// Returns `(ciphertext, iv)`; the ciphertext is exactly as long as the
/// plaintext. Fails with a crypto error if `key` is not 32 bytes.
pub fn encrypt_chunk(plaintext: &[u8], key: &[u8]) -> ChainfsResult<(Vec<u8>, [u8; IV_SIZE])> {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CfbEnc::new_from_slices(key, &iv)
        .map_err(|e| ChainfsError::Crypto(format!("cipher setup failed: {e}")))?;

    let mut buf = plaintext.to_vec();
    cipher.encrypt(&mut buf);
    Ok((buf, iv))
}

/// Inverse of [`encrypt_chunk`].
pub fn decrypt_chunk(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> ChainfsResult<Vec<u8>> {
    if iv.len() != IV_SIZE {
        return Err(ChainfsError::Format(format!(
            "IV must be {IV_SIZE} bytes, got {}",
            iv.len()
        )));
    }

    let cipher = Aes256CfbDec::new_from_slices(key, iv)
        .map_err(|e| ChainfsError::Crypto(format!("cipher setup failed: {e}")))?;

    let mut buf = ciphertext.to_vec();
    cipher.decrypt(&mut buf);
    Ok(buf)
}

/// One encrypted block as stored in a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedChunk {
    pub iv: [u8; IV_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedChunk {
    pub fn seal(plaintext: &[u8], key: &FileKey) -> ChainfsResult<Self> {
        let (ciphertext, iv) = encrypt_chunk(plaintext, key.as_bytes())?;
        Ok(Self { iv, ciphertext })
    }

    pub fn open(&self, key: &FileKey) -> ChainfsResult<Vec<u8>> {
        decrypt_chunk(&self.ciphertext, key.as_bytes(), &self.iv)
    }

    /// `iv || ciphertext`
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a downloaded blob into IV prefix and ciphertext suffix.
    pub fn from_wire(bytes: &[u8]) -> ChainfsResult<Self> {
        if bytes.len() < IV_SIZE {
            return Err(ChainfsError::Format(format!(
                "chunk too short: {} bytes (minimum {IV_SIZE})",
                bytes.len()
            )));
        }
        let (iv, ciphertext) = bytes.split_at(IV_SIZE);
        let mut arr = [0u8; IV_SIZE];
        arr.copy_from_slice(iv);
        Ok(Self {
            iv: arr,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Length of the plaintext this chunk decrypts to
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Size of the blob on the wire
    pub fn wire_len(&self) -> usize {
        IV_SIZE + self.ciphertext.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn test_key() -> FileKey {
        FileKey::from_bytes([0x42u8; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"hello, encrypted world!";

        let (ciphertext, iv) = encrypt_chunk(plaintext, key.as_bytes()).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = decrypt_chunk(&ciphertext, key.as_bytes(), &iv).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = test_key();
        let chunk = EncryptedChunk::seal(b"", &key).unwrap();
        assert_eq!(chunk.wire_len(), IV_SIZE);
        assert_eq!(chunk.open(&key).unwrap(), b"");
    }

    #[test]
    fn test_fresh_iv_per_chunk() {
        let key = test_key();
        let a = EncryptedChunk::seal(b"same plaintext", &key).unwrap();
        let b = EncryptedChunk::seal(b"same plaintext", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_invalid_key_length() {
        let result = encrypt_chunk(b"data", &[0u8; 7]);
        assert!(matches!(result, Err(ChainfsError::Crypto(_))));

        let result = decrypt_chunk(b"data", &[0u8; 7], &[0u8; IV_SIZE]);
        assert!(matches!(result, Err(ChainfsError::Crypto(_))));
    }

    #[test]
    fn test_short_iv_is_format_error() {
        let key = test_key();
        let result = decrypt_chunk(b"data", key.as_bytes(), &[0u8; 4]);
        assert!(matches!(result, Err(ChainfsError::Format(_))));
    }

    #[test]
    fn test_wire_roundtrip_and_short_blob() {
        let key = test_key();
        let chunk = EncryptedChunk::seal(b"payload bytes", &key).unwrap();
        let wire = chunk.to_wire();
        assert_eq!(wire.len(), IV_SIZE + 13);
        assert_eq!(&wire[..IV_SIZE], &chunk.iv);

        let parsed = EncryptedChunk::from_wire(&wire).unwrap();
        assert_eq!(parsed, chunk);

        let short = EncryptedChunk::from_wire(&wire[..IV_SIZE - 1]);
        assert!(matches!(short, Err(ChainfsError::Format(_))));
    }

    #[test]
    fn test_wrong_key_yields_garbage() {
        let chunk = EncryptedChunk::seal(b"secret data", &test_key()).unwrap();
        let other = FileKey::from_bytes([0x24u8; KEY_SIZE]);
        // No authentication tag: decryption "succeeds" with the wrong plaintext
        let out = chunk.open(&other).unwrap();
        assert_ne!(out, b"secret data");
    }

    #[test]
    fn test_bit_flip_stays_local_to_chunk() {
        let key = test_key();
        let plaintext = vec![0xA5u8; 256];
        let mut chunk = EncryptedChunk::seal(&plaintext, &key).unwrap();
        chunk.ciphertext[100] ^= 0x01;

        let out = chunk.open(&key).unwrap();
        assert_eq!(out.len(), plaintext.len());
        // CFB: the flipped byte and at most the following block are damaged
        assert_eq!(&out[..100], &plaintext[..100]);
        assert_eq!(out[100], plaintext[100] ^ 0x01);
        assert_eq!(&out[128..], &plaintext[128..]);
    }

    #[test]
    fn test_nist_cfb128_aes256_vector() {
        // SP 800-38A F.3.17, first block
        let key: [u8; 32] = [
            0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d,
            0x77, 0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3,
            0x09, 0x14, 0xdf, 0xf4,
        ];
        let iv: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let ciphertext: [u8; 16] = [
            0xdc, 0x7e, 0x84, 0xbf, 0xda, 0x79, 0x16, 0x4b, 0x7e, 0xcd, 0x84, 0x86, 0x98, 0x5d,
            0x38, 0x60,
        ];
        let plaintext: [u8; 16] = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];

        let out = decrypt_chunk(&ciphertext, &key, &iv).unwrap();
        assert_eq!(out, plaintext);
    }
}
