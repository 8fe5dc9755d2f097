use futures::{stream, StreamExt};
use std::{fmt::Display, future::Future};

use crate::error::AppResult;

/// Resolves one lookup per key and returns the results in input order.
///
/// Output length always equals `keys.len()`: a key whose lookup returns
/// `Ok(None)` or fails is replaced by `placeholder(key)`, so one bad key never
/// aborts the batch. At most `concurrency` lookups run at once.
pub async fn resolve_in_order<K, T, L, Fut, P>(
    keys: Vec<K>,
    concurrency: usize,
    lookup: L,
    placeholder: P,
) -> Vec<T>
where
    K: Display + Clone,
    L: Fn(K) -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
    P: Fn(&K) -> T,
{
    let total = keys.len();
    let lookup = &lookup;
    let placeholder = &placeholder;

    let results: Vec<(T, bool)> = stream::iter(keys)
        .map(|key| async move {
            match lookup(key.clone()).await {
                Ok(Some(value)) => (value, true),
                Ok(None) => (placeholder(&key), false),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Batch lookup failed, using placeholder");
                    (placeholder(&key), false)
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let resolved = results.iter().filter(|(_, found)| *found).count();
    tracing::debug!(total, resolved, "Batch resolved");

    results.into_iter().map(|(value, _)| value).collect()
}
