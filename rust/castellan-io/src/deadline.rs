//! Every network operation gets an explicit deadline and an explicit cancellation
//! source; nothing relies on an ambient timeout.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{IoError, IoResult};

/// Race `fut` against `deadline` and `cancel`, mapping whichever fires first into
/// [`IoError::Timeout`] or [`IoError::Canceled`].
pub async fn run_with_deadline<F, T>(fut: F, deadline: Duration, cancel: &CancellationToken) -> IoResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        res = tokio::time::timeout(deadline, fut) => res.map_err(|_| IoError::Timeout),
        _ = cancel.cancelled() => Err(IoError::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_wins_when_future_is_slow() {
        let cancel = CancellationToken::new();
        let result = run_with_deadline(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                42
            },
            Duration::from_millis(5),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(IoError::Timeout)));
    }

    #[tokio::test]
    async fn cancellation_wins_when_token_fires_first() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });
        let result = run_with_deadline(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                42
            },
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(IoError::Canceled)));
    }

    #[tokio::test]
    async fn fast_future_completes_normally() {
        let cancel = CancellationToken::new();
        let result = run_with_deadline(async { 7 }, Duration::from_secs(1), &cancel).await;
        assert_eq!(result.unwrap(), 7);
    }
}
