/// Read-through caching against the Redis [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, queues
/// the result for a background write, expiring per the key's space, and
/// returns it. Errors from the cache read or from `$block` propagate with `?`,
/// so the enclosing function must return `AppResult`.
///
/// # Example
/// ```rust,ignore
/// async fn genres(&self, kind: MediaKind) -> AppResult<Vec<Genre>> {
///     cached!(self.cache, CacheKey::Genres(kind), async {
///         self.fetch_genres(kind).await
///     })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_from_cache(&key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&key, &value);
            Ok(value)
        }
    }};
}
