//! Key derivation: PBKDF2-HMAC-SHA256 passphrase → file key

use chainfs_core::{ChainfsError, ChainfsResult};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KDF_ROUNDS, KEY_SIZE, SALT_SIZE};

/// A 256-bit key shared by every chunk of one file.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Per-file KDF salt. Travels in the clear inside the meta token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Salt(pub [u8; SALT_SIZE]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ChainfsResult<Self> {
        let arr: [u8; SALT_SIZE] = bytes.try_into().map_err(|_| {
            ChainfsError::Format(format!(
                "salt must be {SALT_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Derive the file key from a passphrase.
///
/// With `salt = None` a fresh random salt is drawn; pass the returned salt back
/// in to reproduce the same key.
pub fn derive_key(passphrase: &SecretString, salt: Option<Salt>) -> ChainfsResult<(FileKey, Salt)> {
    let passphrase = passphrase.expose_secret();
    if passphrase.is_empty() {
        return Err(ChainfsError::Config("passphrase is empty".into()));
    }

    let salt = salt.unwrap_or_else(Salt::random);

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt.as_bytes(), KDF_ROUNDS, &mut key);

    Ok((FileKey::from_bytes(key), salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = Salt([1u8; SALT_SIZE]);

        let (key1, s1) = derive_key(&passphrase, Some(salt)).unwrap();
        let (key2, s2) = derive_key(&passphrase, Some(salt)).unwrap();

        assert_eq!(s1, s2);
        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let (key1, _) = derive_key(&passphrase, Some(Salt([1u8; SALT_SIZE]))).unwrap();
        let (key2, _) = derive_key(&passphrase, Some(Salt([2u8; SALT_SIZE]))).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes(), "different salts must produce different keys");
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = Salt([0u8; SALT_SIZE]);

        let (key1, _) = derive_key(&SecretString::from("passphrase-a"), Some(salt)).unwrap();
        let (key2, _) = derive_key(&SecretString::from("passphrase-b"), Some(salt)).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_fresh_salt_is_reproducible() {
        let passphrase = SecretString::from("p@ss");

        let (key, salt) = derive_key(&passphrase, None).unwrap();
        let (again, _) = derive_key(&passphrase, Some(salt)).unwrap();

        assert_eq!(key.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = derive_key(&SecretString::from(""), None);
        assert!(matches!(result, Err(ChainfsError::Config(_))));
    }

    #[test]
    fn test_salt_from_slice_length() {
        assert!(Salt::from_slice(&[0u8; 8]).is_ok());
        assert!(matches!(Salt::from_slice(&[0u8; 7]), Err(ChainfsError::Format(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = FileKey::from_bytes([7u8; KEY_SIZE]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
