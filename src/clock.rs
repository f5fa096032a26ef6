//! Time source used for idle and write timeouts.

use std::future::Future;
use std::time::Duration;

/// Abstracts over the passage of time so the exchange orchestrator's
/// timeout logic can be driven by something other than the real clock
/// in tests.
pub trait Clock: Send + Sync + 'static {
    /// Returns a future that resolves after `dur` has elapsed.
    fn sleep(&self, dur: Duration) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// The default [`Clock`], backed by the Tokio runtime's timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, dur: Duration) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(dur))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokio_clock_sleeps() {
        let clock = TokioClock;
        clock.sleep(Duration::from_millis(1)).await;
    }
}
