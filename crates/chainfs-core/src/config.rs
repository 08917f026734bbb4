use serde::{Deserialize, Serialize};

/// Top-level configuration (loaded from chainfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainfsConfig {
    pub discord: DiscordConfig,
    pub channels: ChannelsConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token (overridden by DISCORD_TOKEN)
    pub token: Option<String>,
    /// Guild that holds the manifest and data channels
    pub server_id: String,
    /// REST API base URL
    pub api_base: String,
    pub user_agent: String,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

/// Topic labels used to recognise chainfs channels in the guild
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub manifest_topic: String,
    pub data_topic: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Passphrase used to derive file keys. Prefer CHAINFS_PASSPHRASE or the
    /// interactive prompt over storing it here.
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum attachment size accepted by the transport, IV included
    pub max_blob_size: usize,
    /// Attempts per chunk before an upload is aborted
    pub max_retry: u32,
    /// Base delay between attempts; doubles after every failure (0 = no delay)
    pub retry_backoff_ms: u64,
    /// Hard cap on records visited while walking a chain
    pub max_chain_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            server_id: String::new(),
            api_base: "https://discord.com/api/v10".into(),
            user_agent: "DiscordBot (https://github.com/chainfs/chainfs, 0.1)".into(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            manifest_topic: "chainfs-manifest".into(),
            data_topic: "chainfs-data".into(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_blob_size: 24_214_400,
            max_retry: 3,
            retry_backoff_ms: 500,
            max_chain_length: 100_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
