//! Discord REST v10 transport
//!
//! Records are channel messages. A chunk is a message with one attachment
//! whose description names the previous chunk (see `link`); when both sit in
//! the same channel the message also replies to it.

use async_trait::async_trait;
use chainfs_core::config::DiscordConfig;
use chainfs_core::types::{BlobRef, ChannelId};
use chainfs_core::{ChainfsError, ChainfsResult};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::link::{plan_backlink, resolve_backlink};
use crate::{Attachment, BlobUpload, ChannelInfo, Record, Transport};

/// Guild text channel
const GUILD_TEXT: u8 = 0;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<AttachmentResponse>,
    #[serde(default)]
    message_reference: Option<MessageReferenceResponse>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    filename: String,
    #[serde(default)]
    size: u64,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageReferenceResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageReference<'a> {
    message_id: &'a str,
    channel_id: &'a str,
    /// Never let Discord silently drop a chain link
    fail_if_not_exists: bool,
}

#[derive(Debug, Serialize)]
struct AttachmentSlot<'a> {
    id: u32,
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    #[serde(skip_serializing_if = "is_blank")]
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentSlot<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateChannel<'a> {
    name: &'a str,
    topic: &'a str,
    #[serde(rename = "type")]
    kind: u8,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

/// `payload_json` for a chunk upload
fn chunk_message<'a>(upload: &BlobUpload<'a>) -> CreateMessage<'a> {
    let link = plan_backlink(upload.channel, upload.reply_to);
    CreateMessage {
        content: upload.content,
        message_reference: link.reply.map(|r| MessageReference {
            message_id: &r.message.0,
            channel_id: &r.channel.0,
            fail_if_not_exists: true,
        }),
        attachments: vec![AttachmentSlot {
            id: 0,
            filename: upload.filename,
            description: link.description,
        }],
    }
}

impl MessageResponse {
    fn into_record(self) -> Record {
        let id = BlobRef::new(self.channel_id, self.id);
        let reply = self.message_reference.and_then(|r| {
            let message = r.message_id?;
            let channel = r.channel_id.unwrap_or_else(|| id.channel.0.clone());
            Some(BlobRef::new(channel, message))
        });
        let first = self.attachments.into_iter().next();
        let backlink = resolve_backlink(
            first.as_ref().and_then(|a| a.description.as_deref()),
            reply,
        );
        let attachment = first.map(|a| Attachment {
            filename: a.filename,
            size: a.size,
            url: a.url,
        });

        Record {
            id,
            content: self.content,
            backlink,
            attachment,
        }
    }
}

impl From<ChannelResponse> for ChannelInfo {
    fn from(c: ChannelResponse) -> Self {
        ChannelInfo {
            id: ChannelId(c.id),
            name: c.name.unwrap_or_default(),
            topic: c.topic,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct DiscordTransport {
    client: Client,
    api_base: String,
    guild_id: String,
    token: String,
}

impl std::fmt::Debug for DiscordTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordTransport")
            .field("api_base", &self.api_base)
            .field("guild_id", &self.guild_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl DiscordTransport {
    pub fn new(cfg: &DiscordConfig, token: &str) -> ChainfsResult<Self> {
        if token.is_empty() {
            return Err(ChainfsError::Config("Discord token is empty".into()));
        }
        if cfg.server_id.is_empty() {
            return Err(ChainfsError::Config("discord.server_id is not set".into()));
        }

        let client = Client::builder()
            .user_agent(&cfg.user_agent)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| ChainfsError::Transport(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            guild_id: cfg.server_id.clone(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", format!("Bot {}", self.token))
    }

    async fn send(&self, what: &str, req: RequestBuilder) -> ChainfsResult<Response> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| ChainfsError::Transport(format!("{what}: {e}")))?;
        check_status(what, resp).await
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        what: &str,
        req: RequestBuilder,
    ) -> ChainfsResult<T> {
        self.send(what, req)
            .await?
            .json()
            .await
            .map_err(|e| ChainfsError::Transport(format!("{what}: decoding response: {e}")))
    }

    /// Check the token against `GET /users/@me`.
    pub async fn verify_token(&self) -> ChainfsResult<()> {
        self.send("verifying token", self.client.get(self.url("/users/@me")))
            .await
            .map(|_| ())
    }
}

async fn check_status(what: &str, resp: Response) -> ChainfsResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let hint = if status == StatusCode::TOO_MANY_REQUESTS {
        " (rate limited)"
    } else {
        ""
    };
    Err(ChainfsError::Transport(format!(
        "{what}: unexpected status {status}{hint}: {}",
        body.chars().take(200).collect::<String>()
    )))
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn upload_blob(&self, upload: BlobUpload<'_>) -> ChainfsResult<BlobRef> {
        let payload = chunk_message(&upload);
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| ChainfsError::Transport(format!("encoding payload_json: {e}")))?;

        let file = Part::bytes(upload.payload.to_vec())
            .file_name(upload.filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ChainfsError::Transport(format!("building attachment part: {e}")))?;
        let form = Form::new()
            .text("payload_json", payload_json)
            .part("files[0]", file);

        let url = self.url(&format!("/channels/{}/messages", upload.channel));
        let msg: MessageResponse = self
            .send_json("uploading attachment", self.client.post(url).multipart(form))
            .await?;

        debug!(channel = %upload.channel, message = %msg.id, bytes = upload.payload.len(), "blob uploaded");
        Ok(BlobRef::new(msg.channel_id, msg.id))
    }

    async fn post_text(&self, channel: &ChannelId, content: &str) -> ChainfsResult<BlobRef> {
        let payload = CreateMessage {
            content,
            message_reference: None,
            attachments: Vec::new(),
        };
        let url = self.url(&format!("/channels/{channel}/messages"));
        let msg: MessageResponse = self
            .send_json("posting message", self.client.post(url).json(&payload))
            .await?;
        Ok(BlobRef::new(msg.channel_id, msg.id))
    }

    async fn fetch_record(&self, id: &BlobRef) -> ChainfsResult<Record> {
        let url = self.url(&format!("/channels/{}/messages/{}", id.channel, id.message));
        let msg: MessageResponse = self
            .send_json("getting message", self.client.get(url))
            .await?;
        Ok(msg.into_record())
    }

    async fn download_bytes(&self, url: &str) -> ChainfsResult<Vec<u8>> {
        // CDN URLs are pre-signed; no Authorization header
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChainfsError::Transport(format!("downloading chunk: {e}")))?;

        if resp.status() != StatusCode::OK {
            return Err(ChainfsError::Transport(format!(
                "failed to download chunk: status {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChainfsError::Transport(format!("reading chunk body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn list_channels(&self) -> ChainfsResult<Vec<ChannelInfo>> {
        let url = self.url(&format!("/guilds/{}/channels", self.guild_id));
        let channels: Vec<ChannelResponse> = self
            .send_json("getting channels", self.client.get(url))
            .await?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .map(ChannelInfo::from)
            .collect())
    }

    async fn create_channel(&self, name: &str, topic: &str) -> ChainfsResult<ChannelInfo> {
        let url = self.url(&format!("/guilds/{}/channels", self.guild_id));
        let body = CreateChannel {
            name,
            topic,
            kind: GUILD_TEXT,
        };
        let channel: ChannelResponse = self
            .send_json("creating channel", self.client.post(url).json(&body))
            .await?;
        Ok(channel.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk_message() {
        let json = r#"{
            "id": "200",
            "channel_id": "10",
            "content": "",
            "attachments": [
                {"id": "1", "filename": "3.enc", "size": 1040, "url": "https://cdn.example/3.enc"}
            ],
            "message_reference": {"message_id": "199", "channel_id": "11", "guild_id": "1"},
            "tts": false
        }"#;
        let msg: MessageResponse = serde_json::from_str(json).unwrap();
        let record = msg.into_record();

        assert_eq!(record.id, BlobRef::new("10", "200"));
        assert_eq!(record.backlink, Some(BlobRef::new("11", "199")));
        let att = record.attachment.unwrap();
        assert_eq!(att.filename, "3.enc");
        assert_eq!(att.size, 1040);
    }

    #[test]
    fn test_decode_head_message() {
        let json = r#"{
            "id": "100",
            "channel_id": "10",
            "content": "bWV0YQ==",
            "attachments": [{"filename": "0.enc", "size": 16, "url": "u"}]
        }"#;
        let record = serde_json::from_str::<MessageResponse>(json)
            .unwrap()
            .into_record();
        assert_eq!(record.content, "bWV0YQ==");
        assert!(record.backlink.is_none());
    }

    #[test]
    fn test_reference_without_channel_uses_own_channel() {
        let json = r#"{"id": "5", "channel_id": "9", "message_reference": {"message_id": "4"}}"#;
        let record = serde_json::from_str::<MessageResponse>(json)
            .unwrap()
            .into_record();
        assert_eq!(record.backlink, Some(BlobRef::new("9", "4")));
        assert!(record.attachment.is_none());
    }

    fn chunk_upload<'a>(channel: &'a ChannelId, prev: Option<&'a BlobRef>) -> BlobUpload<'a> {
        BlobUpload {
            channel,
            payload: b"x",
            filename: "1.enc",
            content: "",
            reply_to: prev,
        }
    }

    #[test]
    fn test_encode_same_channel_chunk() {
        let prev = BlobRef::new("10", "199");
        let channel = ChannelId("10".into());
        let v = serde_json::to_value(chunk_message(&chunk_upload(&channel, Some(&prev)))).unwrap();

        assert!(v.get("content").is_none());
        assert_eq!(v["message_reference"]["message_id"], "199");
        assert_eq!(v["message_reference"]["fail_if_not_exists"], true);
        assert_eq!(v["attachments"][0]["filename"], "1.enc");
        assert_eq!(v["attachments"][0]["description"], "chainfs-prev:10/199");
    }

    #[test]
    fn test_encode_cross_channel_chunk_has_no_reply() {
        let prev = BlobRef::new("10", "199");
        let channel = ChannelId("11".into());
        let v = serde_json::to_value(chunk_message(&chunk_upload(&channel, Some(&prev)))).unwrap();

        assert!(v.get("message_reference").is_none());
        assert_eq!(v["attachments"][0]["description"], "chainfs-prev:10/199");
    }

    #[test]
    fn test_encode_head_chunk() {
        let channel = ChannelId("10".into());
        let v = serde_json::to_value(chunk_message(&chunk_upload(&channel, None))).unwrap();
        assert!(v.get("message_reference").is_none());
        assert!(v["attachments"][0].get("description").is_none());
    }

    #[test]
    fn test_decode_cross_channel_backlink() {
        let json = r#"{
            "id": "300",
            "channel_id": "11",
            "content": "",
            "attachments": [
                {"filename": "1.enc", "size": 32, "url": "u", "description": "chainfs-prev:10/199"}
            ]
        }"#;
        let record = serde_json::from_str::<MessageResponse>(json)
            .unwrap()
            .into_record();
        assert_eq!(record.backlink, Some(BlobRef::new("10", "199")));
    }

    #[test]
    fn test_new_requires_token_and_guild() {
        let cfg = DiscordConfig {
            server_id: "1".into(),
            ..Default::default()
        };
        assert!(matches!(
            DiscordTransport::new(&cfg, ""),
            Err(ChainfsError::Config(_))
        ));
        assert!(matches!(
            DiscordTransport::new(&DiscordConfig::default(), "tok"),
            Err(ChainfsError::Config(_))
        ));
        let t = DiscordTransport::new(&cfg, "tok").unwrap();
        assert!(format!("{t:?}").contains("REDACTED"));
    }
}
