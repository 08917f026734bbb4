//! Meta token: `(filename, salt)` carried in the clear next to chunk data
//!
//! ```text
//! token = base64( filename || 0x00 || base64(salt) )
//! ```
//!
//! Anyone holding a token can read the filename and salt; only the passphrase
//! is secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chainfs_core::{ChainfsError, ChainfsResult};
use tracing::warn;

use crate::kdf::Salt;

const SEPARATOR: u8 = 0;

/// Decoded contents of a meta token.
///
/// `FileMeta::default()` (empty name, no salt) is the degraded result of a
/// malformed token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub salt: Option<Salt>,
}

impl FileMeta {
    /// Strict decode: any malformation is a format error.
    pub fn try_parse(token: &str) -> ChainfsResult<Self> {
        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|e| ChainfsError::Format(format!("meta token base64: {e}")))?;

        let fields: Vec<&[u8]> = decoded.split(|b| *b == SEPARATOR).collect();
        if fields.len() != 2 {
            return Err(ChainfsError::Format(format!(
                "meta token has {} fields, expected 2",
                fields.len()
            )));
        }

        let name = String::from_utf8(fields[0].to_vec())
            .map_err(|_| ChainfsError::Format("meta token filename is not UTF-8".into()))?;
        let salt = STANDARD
            .decode(fields[1])
            .map_err(|e| ChainfsError::Format(format!("meta token salt base64: {e}")))?;

        Ok(Self {
            name,
            salt: Some(Salt::from_slice(&salt)?),
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.salt.is_none()
    }
}

/// Encode `(filename, salt)` as a meta token.
pub fn generate_meta(name: &str, salt: &Salt) -> String {
    let mut raw = Vec::with_capacity(name.len() + 1 + 12);
    raw.extend_from_slice(name.as_bytes());
    raw.push(SEPARATOR);
    raw.extend_from_slice(STANDARD.encode(salt.as_bytes()).as_bytes());
    STANDARD.encode(raw)
}

/// Lenient decode used on the retrieval path.
///
/// A malformed token is logged and yields [`FileMeta::default`] instead of an
/// error.
pub fn parse_meta(token: &str) -> FileMeta {
    match FileMeta::try_parse(token) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(error = %e, "invalid meta token");
            FileMeta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_meta_roundtrip() {
        let salt = Salt([0u8; 8]);
        let token = generate_meta("report.pdf", &salt);
        let meta = parse_meta(&token);
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.salt, Some(salt));
        assert!(!meta.is_degraded());
    }

    #[test]
    fn test_known_encoding() {
        // "a" NUL base64([0;8]) = "a\0AAAAAAAAAAA="
        let token = generate_meta("a", &Salt([0u8; 8]));
        let raw = STANDARD.decode(&token).unwrap();
        assert_eq!(raw, b"a\0AAAAAAAAAAA=");
    }

    #[test]
    fn test_malformed_tokens_degrade() {
        let cases: Vec<String> = vec![
            String::new(),
            "!!!not base64!!!".to_string(),
            // no separator
            STANDARD.encode(b"just-a-name"),
            // three fields
            STANDARD.encode(b"a\0b\0c"),
            // salt not base64
            STANDARD.encode(b"name\0***"),
            // salt of the wrong length
            STANDARD.encode(b"name\0AAAA"),
        ];
        for token in &cases {
            let meta = parse_meta(token);
            assert_eq!(meta, FileMeta::default(), "token {token:?} should degrade");
            assert!(FileMeta::try_parse(token).is_err());
        }
    }

    proptest! {
        #[test]
        fn prop_meta_roundtrip(name in "[ -~]{0,64}", salt in any::<[u8; 8]>()) {
            let salt = Salt(salt);
            let meta = FileMeta::try_parse(&generate_meta(&name, &salt)).unwrap();
            prop_assert_eq!(meta.name, name);
            prop_assert_eq!(meta.salt, Some(salt));
        }

        #[test]
        fn prop_parse_never_panics(token in "\\PC*") {
            let _ = parse_meta(&token);
        }
    }
}
