use async_trait::async_trait;
use tracing::info;

use super::backend::NotifyBackend;

/// Logs notifications instead of sending them.
pub struct DryRunBackend;

#[async_trait]
impl NotifyBackend for DryRunBackend {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        info!(text, "Dry run, notification not sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
