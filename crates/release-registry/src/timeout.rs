//! Bounded waiting for external calls

use futures::future::{Either, select};
use smol::Timer;
use std::future::Future;
use std::time::Duration;

/// Run a future, giving up after `limit`
///
/// Returns `None` when the limit elapsed first. The abandoned future is
/// dropped.
pub async fn with_timeout<F>(limit: Duration, future: F) -> Option<F::Output>
where
    F: Future,
{
    let future = Box::pin(future);
    let timer = Timer::after(limit);
    match select(future, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_completes_in_time() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Some(42));
    }

    #[smol_potat::test]
    async fn test_times_out() {
        let result = with_timeout(Duration::from_millis(10), async {
            Timer::after(Duration::from_secs(5)).await;
            42
        })
        .await;
        assert_eq!(result, None);
    }
}
