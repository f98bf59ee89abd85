pub mod email;

use async_trait::async_trait;

use crate::models::AlertRecord;
use crate::utils::error::Result;

/// Delivery seam for alert batches. Implementations must deduplicate by
/// (label, identifier) and treat an empty batch as "do not notify".
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when a notification was actually sent.
    async fn notify(&self, alerts: &[AlertRecord]) -> Result<bool>;
}

pub use email::EmailNotifier;
