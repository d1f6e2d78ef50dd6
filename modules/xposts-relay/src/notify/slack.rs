use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::NotifyBackend;

/// Slack incoming webhook notification backend.
pub struct SlackWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(webhook_url: String, http: reqwest::Client) -> Self {
        Self { webhook_url, http }
    }

    /// Slack links are `<url|label>`, not markdown.
    fn to_mrkdwn(text: &str) -> String {
        let Some(open) = text.find("](") else {
            return text.to_string();
        };
        let Some(label_start) = text[..open].rfind('[') else {
            return text.to_string();
        };
        let Some(close) = text[open..].find(')').map(|i| open + i) else {
            return text.to_string();
        };
        format!(
            "{}<{}|{}>{}",
            &text[..label_start],
            &text[open + 2..close],
            &text[label_start + 1..open],
            &text[close + 1..]
        )
    }
}

#[async_trait]
impl NotifyBackend for SlackWebhook {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let payload = json!({
            "text": Self::to_mrkdwn(text),
            "unfurl_links": false,
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned non-success");
            anyhow::bail!("Slack webhook returned {status}");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
