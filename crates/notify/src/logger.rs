use async_trait::async_trait;
use switchboard_core::error::NotifyError;
use switchboard_core::notify::Notifier;
use tracing::info;

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        info!(target: "switchboard::notify", message = %text, "Operator notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        assert!(LogNotifier.notify("failover anthropic → openrouter").await.is_ok());
    }
}
