//! Timeout wrapper for collaborator calls.

use std::future::Future;
use std::time::Duration;

use wheel_trade_core::{Collaborator, WheelError, WheelResult};

/// Runs `call`, failing with [`WheelError::Timeout`] once `limit` elapses.
///
/// # Errors
///
/// Whatever `call` returns, or a timeout tagged with `collaborator`.
pub async fn bounded<T, F>(collaborator: Collaborator, limit: Duration, call: F) -> WheelResult<T>
where
    F: Future<Output = WheelResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(WheelError::timeout(collaborator, limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_results() {
        let value = bounded(Collaborator::Broker, Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_calls_time_out() {
        let result: WheelResult<()> = bounded(Collaborator::MarketData, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        match result {
            Err(WheelError::Timeout { collaborator, secs }) => {
                assert_eq!(collaborator, Collaborator::MarketData);
                assert_eq!(secs, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
