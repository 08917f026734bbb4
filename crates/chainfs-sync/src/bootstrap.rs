//! Channel discovery by topic label
//!
//! The guild holds one manifest channel and one or more data channels, told
//! apart by their topic. Missing channels are created.

use chainfs_core::config::ChannelsConfig;
use chainfs_core::types::ChannelTopology;
use chainfs_core::{ChainfsError, ChainfsResult};
use chainfs_transport::{ChannelInfo, Transport};
use tracing::info;

/// Find chainfs channels among `channels`. Returns `None` for the manifest
/// channel if no channel carries the manifest topic.
pub fn classify(
    channels: &[ChannelInfo],
    labels: &ChannelsConfig,
) -> (Option<ChannelInfo>, Vec<ChannelInfo>) {
    let has_topic = |c: &&ChannelInfo, topic: &str| c.topic.as_deref() == Some(topic);

    let manifest = channels
        .iter()
        .find(|c| has_topic(c, &labels.manifest_topic))
        .cloned();
    let data = channels
        .iter()
        .filter(|c| has_topic(c, &labels.data_topic))
        .cloned()
        .collect();
    (manifest, data)
}

/// Discover the manifest and data channels, creating whichever is missing.
pub async fn discover_channels(
    transport: &dyn Transport,
    labels: &ChannelsConfig,
) -> ChainfsResult<ChannelTopology> {
    let (mut manifest, mut data) = classify(&transport.list_channels().await?, labels);

    if manifest.is_none() {
        info!(topic = %labels.manifest_topic, "manifest channel not found, creating");
        transport
            .create_channel(&labels.manifest_topic, &labels.manifest_topic)
            .await?;
    }
    if data.is_empty() {
        info!(topic = %labels.data_topic, "data channel not found, creating");
        transport
            .create_channel(&labels.data_topic, &labels.data_topic)
            .await?;
    }
    if manifest.is_none() || data.is_empty() {
        (manifest, data) = classify(&transport.list_channels().await?, labels);
    }

    let manifest = manifest.ok_or_else(|| {
        ChainfsError::Transport("manifest channel missing after creation".into())
    })?;
    if data.is_empty() {
        return Err(ChainfsError::Transport(
            "data channel missing after creation".into(),
        ));
    }

    info!(
        manifest = %manifest.id,
        data_channels = data.len(),
        "channels ready"
    );

    Ok(ChannelTopology {
        manifest: manifest.id,
        data: data.into_iter().map(|c| c.id).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfs_transport::MemoryTransport;

    #[tokio::test]
    async fn creates_missing_channels_once() {
        let transport = MemoryTransport::new();
        let labels = ChannelsConfig::default();

        let first = discover_channels(&transport, &labels).await.unwrap();
        assert_eq!(first.data.len(), 1);

        let second = discover_channels(&transport, &labels).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.list_channels().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn picks_up_every_data_channel() {
        let transport = MemoryTransport::new();
        let labels = ChannelsConfig::default();
        transport.create_channel("general", "chit chat").await.unwrap();
        transport.create_channel("m", "chainfs-manifest").await.unwrap();
        let a = transport.create_channel("d1", "chainfs-data").await.unwrap();
        let b = transport.create_channel("d2", "chainfs-data").await.unwrap();

        let topo = discover_channels(&transport, &labels).await.unwrap();
        assert_eq!(topo.data, vec![a.id, b.id]);
        assert_eq!(transport.list_channels().await.unwrap().len(), 4);
    }

    #[test]
    fn classify_ignores_untagged_channels() {
        let labels = ChannelsConfig::default();
        let channels = vec![ChannelInfo {
            id: chainfs_core::types::ChannelId("1".into()),
            name: "general".into(),
            topic: None,
        }];
        let (manifest, data) = classify(&channels, &labels);
        assert!(manifest.is_none());
        assert!(data.is_empty());
    }
}
