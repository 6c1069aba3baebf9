use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::ArchiveError;

const API_BASE: &str = "https://discord.com/api/v10";
const CDN_BASE: &str = "https://cdn.discordapp.com";
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }

    /// CDN URL of the user's avatar, or of the default avatar when unset.
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => {
                let ext = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{}/avatars/{}/{}.{}", CDN_BASE, self.id, hash, ext)
            }
            None => format!(
                "{}/embed/avatars/{}.png",
                CDN_BASE,
                self.default_avatar_index()
            ),
        }
    }

    fn default_avatar_index(&self) -> u64 {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => d.parse::<u64>().unwrap_or(0) % 5,
            _ => self.id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
    pub author: User,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Minimal bot-token REST client for reading one thread.
pub struct DiscordClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, API_BASE)
    }

    pub fn with_base(token: &str, base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("link_archive/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DiscordClient {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        let endpoint = format!("/channels/{}", channel_id);
        let resp = self
            .http
            .get(format!("{}{}", self.base, endpoint))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", endpoint))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ArchiveError::ThreadNotFound(channel_id.to_string()).into());
        }
        if !status.is_success() {
            return Err(ArchiveError::Discord { endpoint, status }.into());
        }
        Ok(resp.json().await.context("Malformed channel payload")?)
    }

    /// One page of up to `PAGE_SIZE` messages, newest first, older than `before`.
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
    ) -> Result<Vec<Message>> {
        let endpoint = format!("/channels/{}/messages", channel_id);
        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let Some(id) = before {
            query.push(("before", id.to_string()));
        }

        let resp = self
            .http
            .get(format!("{}{}", self.base, endpoint))
            .header("Authorization", format!("Bot {}", self.token))
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Discord { endpoint, status }.into());
        }
        Ok(resp.json().await.context("Malformed messages payload")?)
    }

    /// Walk the thread backwards until a short page comes back.
    pub async fn fetch_all_messages(&self, channel_id: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let batch = self.fetch_messages(channel_id, before.as_deref()).await?;
            let size = batch.len();
            before = batch.last().map(|m| m.id.clone());
            messages.extend(batch);
            info!("Fetched {} messages ({} total)", size, messages.len());

            if size < PAGE_SIZE {
                break;
            }
        }

        Ok(messages)
    }
}
