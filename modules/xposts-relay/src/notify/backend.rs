use async_trait::async_trait;

/// Pluggable sink for relay notifications.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Send one text message to the configured channel.
    async fn send(&self, text: &str) -> anyhow::Result<()>;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}
