//! Bounded retry with a fixed delay for transport operations.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// How many times, and how far apart, a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Override the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the inter-attempt delay.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub(crate) enum Attempted<T> {
    Done(T),
    Failed(TransportError),
    Cancelled,
}

/// Run `operation` until it succeeds, fails permanently, exhausts the
/// policy or `cancel` fires during a delay.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Attempted::Cancelled;
        }
        let error = match operation().await {
            Ok(value) => return Attempted::Done(value),
            Err(error) => error,
        };
        if !error.is_transient() || attempt >= attempts {
            return Attempted::Failed(error);
        }
        warn!(
            "Attempt {attempt}/{attempts} for {what} failed: {error}; retrying in {:?}",
            policy.delay
        );
        tokio::select! {
            () = cancel.cancelled() => return Attempted::Cancelled,
            () = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io;

    use rstest::rstest;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("build runtime")
    }

    fn network_error() -> TransportError {
        TransportError::Network {
            url: "http://upstream.example".to_owned(),
            source: io::Error::other("connection reset"),
        }
    }

    #[rstest]
    fn retries_transient_failures_until_success() {
        let calls = Cell::new(0_u32);
        let outcome = runtime().block_on(with_retry(
            RetryPolicy::default(),
            &CancellationToken::new(),
            "listing",
            || {
                calls.set(calls.get() + 1);
                let current = calls.get();
                async move {
                    if current < 3 {
                        Err(network_error())
                    } else {
                        Ok(current)
                    }
                }
            },
        ));
        assert!(matches!(outcome, Attempted::Done(3)));
        assert_eq!(calls.get(), 3);
    }

    #[rstest]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0_u32);
        let outcome: Attempted<()> = runtime().block_on(with_retry(
            RetryPolicy::default().with_max_attempts(4),
            &CancellationToken::new(),
            "listing",
            || {
                calls.set(calls.get() + 1);
                async { Err(network_error()) }
            },
        ));
        assert!(matches!(outcome, Attempted::Failed(TransportError::Network { .. })));
        assert_eq!(calls.get(), 4);
    }

    #[rstest]
    fn client_errors_are_not_retried() {
        let calls = Cell::new(0_u32);
        let outcome: Attempted<()> = runtime().block_on(with_retry(
            RetryPolicy::default(),
            &CancellationToken::new(),
            "file",
            || {
                calls.set(calls.get() + 1);
                async {
                    Err(TransportError::Http {
                        url: "http://upstream.example/x.csv".to_owned(),
                        status: 404,
                        message: "not found".to_owned(),
                    })
                }
            },
        ));
        assert!(matches!(outcome, Attempted::Failed(TransportError::Http { status: 404, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[rstest]
    fn cancellation_interrupts_the_delay() {
        let cancel = CancellationToken::new();
        let calls = Cell::new(0_u32);
        let outcome: Attempted<()> = runtime().block_on(with_retry(
            RetryPolicy::default().with_delay(Duration::from_secs(3600)),
            &cancel,
            "document",
            || {
                calls.set(calls.get() + 1);
                cancel.cancel();
                async { Err(network_error()) }
            },
        ));
        assert!(matches!(outcome, Attempted::Cancelled));
        assert_eq!(calls.get(), 1);
    }
}
