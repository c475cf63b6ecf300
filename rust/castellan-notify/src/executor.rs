use async_trait::async_trait;
use castellan_registry::{CheckResult, Checkable};

use crate::error::NotifyResult;
use crate::types::NotificationType;

/// The actual delivery mechanism -- a notification command, a webhook, an email
/// relay. Implementations live outside this crate; the engine only knows how to
/// decide *whether* and *who* to notify.
#[async_trait]
pub trait NotificationExecutor: Send + Sync {
    async fn send(
        &self,
        user: &str,
        checkable: &Checkable,
        ntype: NotificationType,
        result: &CheckResult,
    ) -> NotifyResult<()>;
}
