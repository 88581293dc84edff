//! Bounded concurrency for collaborator fan-out.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Run `futures` with at most `limit` in flight, returning results in input order.
///
/// Futures are polled on the calling task, so they need not be `Send`.
pub async fn bounded_join_all<I, F>(futures: I, limit: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    stream::iter(futures)
        .buffered(limit.max(1))
        .collect()
        .await
}
