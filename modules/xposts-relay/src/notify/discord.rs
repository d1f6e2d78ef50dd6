use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::backend::NotifyBackend;

pub const DISCORD_API: &str = "https://discord.com/api/v10";

/// Longest rate-limit pause honored before giving up on a message.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum VerifyError {
    /// The token is invalid or lacks access. Not worth retrying.
    #[error("Discord rejected bot token ({0})")]
    Rejected(StatusCode),

    #[error("Discord unreachable: {0}")]
    Unreachable(String),
}

/// Posts messages to one Discord channel through the bot REST API.
pub struct DiscordChannel {
    api_base: String,
    token: String,
    channel_id: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

impl DiscordChannel {
    pub fn new(token: String, channel_id: String, http: reqwest::Client) -> Self {
        Self {
            api_base: DISCORD_API.to_string(),
            token,
            channel_id,
            http,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Check the bot token. Returns the bot's tag.
    pub async fn verify(&self) -> Result<String, VerifyError> {
        let resp = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| VerifyError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VerifyError::Rejected(status));
        }
        if !status.is_success() {
            return Err(VerifyError::Unreachable(format!("Discord returned {status}")));
        }

        let user: CurrentUser = resp
            .json()
            .await
            .map_err(|e| VerifyError::Unreachable(e.to_string()))?;
        let tag = match user.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{d}", user.username),
            _ => user.username,
        };
        info!(bot = %tag, channel_id = %self.channel_id, "Logged in to Discord");
        Ok(tag)
    }

    async fn post_message(&self, text: &str) -> anyhow::Result<reqwest::Response> {
        let payload = json!({
            "content": text,
            "allowed_mentions": { "parse": [] },
        });

        Ok(self
            .http
            .post(format!(
                "{}/channels/{}/messages",
                self.api_base, self.channel_id
            ))
            .header("Authorization", self.auth())
            .json(&payload)
            .send()
            .await?)
    }
}

#[async_trait]
impl NotifyBackend for DiscordChannel {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let mut resp = self.post_message(text).await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = resp
                .json::<RateLimited>()
                .await
                .ok()
                .and_then(|r| Duration::try_from_secs_f64(r.retry_after).ok())
                .unwrap_or(Duration::from_secs(1))
                .min(MAX_RATE_LIMIT_WAIT);
            warn!(wait_ms = wait.as_millis() as u64, "Discord rate limited, retrying once");
            tokio::time::sleep(wait).await;
            resp = self.post_message(text).await?;
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Discord returned non-success");
            anyhow::bail!("Discord returned {status}");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
