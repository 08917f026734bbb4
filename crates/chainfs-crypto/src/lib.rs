//! chainfs-crypto: the cipher envelope for chunk chains
//!
//! ```text
//! passphrase ─┐
//!             ├─ PBKDF2-HMAC-SHA256 (4096 rounds) ─> 256-bit file key
//! 8-byte salt ┘
//!
//! chunk on the wire:  [16 bytes: random IV][N bytes: AES-256-CFB ciphertext]
//! meta token:         base64(filename || 0x00 || base64(salt))
//! ```
//!
//! CFB is a stream mode with no authentication tag: ciphertext length equals
//! plaintext length and tampering is not detected.

pub mod chunk;
pub mod kdf;
pub mod meta;

pub use chunk::{decrypt_chunk, encrypt_chunk, EncryptedChunk};
pub use kdf::{derive_key, FileKey, Salt};
pub use meta::{generate_meta, parse_meta, FileMeta};

/// Size of the derived file key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the KDF salt carried in the meta token
pub const SALT_SIZE: usize = 8;

/// AES block size; every wire chunk starts with an IV of this length
pub const IV_SIZE: usize = 16;

/// PBKDF2 iteration count
pub const KDF_ROUNDS: u32 = 4096;
