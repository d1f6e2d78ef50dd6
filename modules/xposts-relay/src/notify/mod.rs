pub mod backend;
pub mod discord;
pub mod dry_run;
pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::SinkConfig;
use backend::NotifyBackend;
use discord::{DiscordChannel, VerifyError};
use dry_run::DryRunBackend;
use slack::SlackWebhook;

/// Build the configured notification backend. A Discord token is checked
/// against the API before any account loop starts.
pub async fn connect(
    sink: &SinkConfig,
    request_timeout: Duration,
) -> anyhow::Result<Arc<dyn NotifyBackend>> {
    let http = reqwest::Client::builder().timeout(request_timeout).build()?;

    let backend: Arc<dyn NotifyBackend> = match sink {
        SinkConfig::Discord { token, channel_id } => {
            let channel = DiscordChannel::new(token.clone(), channel_id.clone(), http);
            ensure_discord_login(&channel).await?;
            Arc::new(channel)
        }
        SinkConfig::Slack { webhook_url } => Arc::new(SlackWebhook::new(webhook_url.clone(), http)),
        SinkConfig::DryRun => Arc::new(DryRunBackend),
    };

    info!(backend = backend.name(), "Notifications enabled");
    Ok(backend)
}

/// Startup token check. A rejected token is fatal; an unreachable API is
/// logged and the relay starts anyway, since each send reports its own failure.
pub async fn ensure_discord_login(channel: &DiscordChannel) -> anyhow::Result<()> {
    match channel.verify().await {
        Ok(_) => Ok(()),
        Err(e @ VerifyError::Rejected(_)) => Err(e.into()),
        Err(e @ VerifyError::Unreachable(_)) => {
            warn!(error = %e, "Could not verify Discord token, continuing");
            Ok(())
        }
    }
}
