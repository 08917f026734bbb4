use thiserror::Error;

pub type ChainfsResult<T> = Result<T, ChainfsError>;

#[derive(Debug, Error)]
pub enum ChainfsError {
    /// Missing or invalid passphrase, derivation input, or setting
    #[error("config error: {0}")]
    Config(String),

    /// Any network or API failure; transient and permanent are not distinguished
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed meta token, undersized chunk, broken chain
    #[error("format error: {0}")]
    Format(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChainfsError {
    /// True for errors the upload path is allowed to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChainfsError::Transport(_))
    }
}
