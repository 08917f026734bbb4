//! Session: everything an operation needs, passed in explicitly

use chainfs_core::config::TransferConfig;
use chainfs_core::types::{ChannelTopology, Locator};
use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_transport::Transport;
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::retry::RetryPolicy;

/// Transfer knobs taken from `[transfer]`
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub max_blob_size: usize,
    pub retry: RetryPolicy,
    pub max_chain_length: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl TransferSettings {
    pub fn from_config(cfg: &TransferConfig) -> Self {
        Self {
            max_blob_size: cfg.max_blob_size,
            retry: RetryPolicy::from_config(cfg),
            max_chain_length: cfg.max_chain_length,
        }
    }
}

/// Locators produced during this process, most recent last.
///
/// Feeds completion in interactive front ends.
#[derive(Debug, Default)]
pub struct LocatorHistory {
    entries: Mutex<Vec<Locator>>,
}

impl LocatorHistory {
    /// Every update leaves the list consistent, so a poisoned lock is safe
    /// to recover.
    fn entries(&self) -> MutexGuard<'_, Vec<Locator>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("locator history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn push(&self, locator: Locator) {
        let mut entries = self.entries();
        entries.retain(|l| l != &locator);
        entries.push(locator);
    }

    pub fn snapshot(&self) -> Vec<Locator> {
        self.entries().clone()
    }

    /// Known locators starting with `prefix`, most recent first.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.snapshot()
            .iter()
            .rev()
            .map(|l| l.to_string())
            .filter(|s| s.starts_with(prefix))
            .collect()
    }
}

/// An authenticated transport plus the channel layout discovered at
/// bootstrap. Cheap to share behind an `Arc`; independent operations may
/// run concurrently on one session.
pub struct Session {
    transport: Arc<dyn Transport>,
    topology: ChannelTopology,
    passphrase: SecretString,
    settings: TransferSettings,
    history: LocatorHistory,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("topology", &self.topology)
            .field("settings", &self.settings)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        topology: ChannelTopology,
        passphrase: SecretString,
        settings: TransferSettings,
    ) -> ChainfsResult<Self> {
        if topology.data.is_empty() {
            return Err(ChainfsError::Config(
                "session needs at least one data channel".into(),
            ));
        }
        Ok(Self {
            transport,
            topology,
            passphrase,
            settings,
            history: LocatorHistory::default(),
        })
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn topology(&self) -> &ChannelTopology {
        &self.topology
    }

    pub fn passphrase(&self) -> &SecretString {
        &self.passphrase
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn history(&self) -> &LocatorHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfs_core::types::{BlobRef, ChannelId};
    use chainfs_transport::MemoryTransport;

    #[test]
    fn history_dedups_and_completes() {
        let history = LocatorHistory::default();
        history.push(BlobRef::new("10", "111").into());
        history.push(BlobRef::new("10", "222").into());
        history.push(BlobRef::new("20", "333").into());
        history.push(BlobRef::new("10", "111").into());

        assert_eq!(history.snapshot().len(), 3);
        assert_eq!(history.complete("10/"), vec!["10/111", "10/222"]);
        assert!(history.complete("99").is_empty());
    }

    #[test]
    fn history_survives_poisoned_lock() {
        let history = Arc::new(LocatorHistory::default());
        history.push(BlobRef::new("10", "111").into());

        let holder = history.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("panic while holding the history lock");
        })
        .join();
        assert!(panicked.is_err());
        assert!(history.entries.is_poisoned());

        history.push(BlobRef::new("10", "222").into());
        assert_eq!(
            history.snapshot(),
            vec![
                Locator::from(BlobRef::new("10", "111")),
                Locator::from(BlobRef::new("10", "222")),
            ]
        );
    }

    #[test]
    fn session_requires_data_channel() {
        let topology = ChannelTopology {
            manifest: ChannelId("1".into()),
            data: vec![],
        };
        let result = Session::new(
            Arc::new(MemoryTransport::new()),
            topology,
            SecretString::from("p"),
            TransferSettings::default(),
        );
        assert!(matches!(result, Err(ChainfsError::Config(_))));
    }
}
