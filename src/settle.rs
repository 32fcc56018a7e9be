//! Run independent branches to completion and keep every outcome.
//!
//! Unlike `try_join_all`, a failed branch never cancels its siblings: each
//! one is driven until it resolves and its result is reported on its own.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;

/// Outcome of one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(err) => Settled::Rejected(err),
        }
    }
}

/// Drive all branches concurrently; results come back in input order.
pub async fn settle_all<I, F, T, E>(branches: I) -> Vec<Settled<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(branches)
        .await
        .into_iter()
        .map(Settled::from)
        .collect()
}

/// Apply an optional deadline to a fallible future. `None` waits forever.
pub async fn bounded<F, T, E>(
    limit: Option<Duration>,
    future: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit)),
        },
        None => future.await,
    }
}
