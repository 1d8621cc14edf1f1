//! Operator notification trait.

use async_trait::async_trait;

use crate::error::NotifyError;

/// Out-of-band channel used to tell the operator about noteworthy events,
/// such as a chat turn that had to fail over to a secondary provider.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}
