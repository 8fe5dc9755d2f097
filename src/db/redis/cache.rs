use redis::AsyncCommands;
use redis::Client;
use std::collections::BTreeMap;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::{MediaKey, MediaKind, TimeWindow};

/// Keys for provider responses cached in Redis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Trending {
        kind: MediaKind,
        window: TimeWindow,
        page: u32,
    },
    Search {
        kind: MediaKind,
        query: String,
        page: u32,
    },
    ExternalIds(MediaKey),
    Genres(MediaKind),
}

const TRENDING_TTL: u64 = 600; // 10 minutes
const SEARCH_TTL: u64 = 3600; // 1 hour
const GENRES_TTL: u64 = 86400; // 1 day
const EXTERNAL_IDS_TTL: u64 = 604800; // 1 week

impl CacheKey {
    /// Key space, the first segment of the Redis key
    pub fn space(&self) -> &'static str {
        match self {
            CacheKey::Trending { .. } => "trending",
            CacheKey::Search { .. } => "search",
            CacheKey::ExternalIds(_) => "extids",
            CacheKey::Genres(_) => "genres",
        }
    }

    /// Expiry in seconds. Trending lists churn, id mappings almost never do.
    pub fn ttl(&self) -> u64 {
        match self {
            CacheKey::Trending { .. } => TRENDING_TTL,
            CacheKey::Search { .. } => SEARCH_TTL,
            CacheKey::ExternalIds(_) => EXTERNAL_IDS_TTL,
            CacheKey::Genres(_) => GENRES_TTL,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Trending { kind, window, page } => {
                write!(f, "{}:{}:{}:{}", self.space(), kind, window, page)
            }
            CacheKey::Search { kind, query, page } => write!(
                f,
                "{}:{}:{}:{}",
                self.space(),
                kind,
                query.trim().to_lowercase(),
                page
            ),
            CacheKey::ExternalIds(key) => write!(f, "{}:{}", self.space(), key),
            CacheKey::Genres(kind) => write!(f, "{}:{}", self.space(), kind),
        }
    }
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    space: &'static str,
    key: String,
    value: String,
    ttl: u64,
}

/// Per key space outcome of queued writes, reported when the writer stops
#[derive(Debug, Default, PartialEq, Eq)]
struct WriteTally {
    written: BTreeMap<&'static str, usize>,
    failed: BTreeMap<&'static str, usize>,
}

impl WriteTally {
    fn record(&mut self, space: &'static str, ok: bool) {
        let counts = if ok { &mut self.written } else { &mut self.failed };
        *counts.entry(space).or_default() += 1;
    }

    fn total_written(&self) -> usize {
        self.written.values().sum()
    }

    fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task, which flushes pending
    /// writes to Redis before exiting.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a new Cache instance with an async write background task
    ///
    /// Cache writes are queued to the background task so they never block
    /// an API response.
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    /// Background task that processes cache write messages
    ///
    /// On shutdown, drains whatever is already queued and exits.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut tally = WriteTally::default();

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    Self::write_logged(&client, msg, &mut tally).await;
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let before = tally.total_written();
                    while let Some(msg) = write_rx.recv().await {
                        Self::write_logged(&client, msg, &mut tally).await;
                    }

                    tracing::info!(
                        flushed = tally.total_written() - before,
                        written = ?tally.written,
                        failed = ?tally.failed,
                        "Cache writer task stopped"
                    );
                    break;
                }
            }
        }
    }

    async fn write_logged(client: &Client, msg: CacheWriteMessage, tally: &mut WriteTally) {
        let space = msg.space;
        match Self::write_to_redis(client, &msg).await {
            Ok(()) => {
                tracing::trace!(space, key = %msg.key, ttl = msg.ttl, "Cached provider response");
                tally.record(space, true);
            }
            Err(e) => {
                tracing::error!(
                    space,
                    key = %msg.key,
                    error = %e,
                    failed = tally.total_failed() + 1,
                    "Failed to write to Redis cache"
                );
                tally.record(space, false);
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: &CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key.as_str(), msg.value.as_str(), msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` when the key is absent.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                tracing::debug!(space = key.space(), key = %key, "Redis cache hit");
                Ok(Some(data))
            }
            None => {
                tracing::debug!(space = key.space(), key = %key, "Redis cache miss");
                Ok(None)
            }
        }
    }

    /// Stores a value in the cache without waiting for the write. The
    /// expiry comes from the key's space.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(space = key.space(), error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            space: key.space(),
            key: key.to_string(),
            value: json,
            ttl: key.ttl(),
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_trending() {
        let key = CacheKey::Trending {
            kind: MediaKind::Movie,
            window: TimeWindow::Week,
            page: 2,
        };
        assert_eq!(key.to_string(), "trending:movie:week:2");
    }

    #[test]
    fn test_cache_key_display_search_normalises_query() {
        let key = CacheKey::Search {
            kind: MediaKind::Tv,
            query: "  THE Wire ".to_string(),
            page: 1,
        };
        assert_eq!(key.to_string(), "search:tv:the wire:1");
    }

    #[test]
    fn test_cache_key_display_external_ids() {
        let key = CacheKey::ExternalIds(MediaKey::new(550, MediaKind::Movie));
        assert_eq!(key.to_string(), "extids:550-movie");
    }

    #[test]
    fn test_cache_key_display_genres() {
        assert_eq!(CacheKey::Genres(MediaKind::Tv).to_string(), "genres:tv");
    }

    #[test]
    fn test_ttl_follows_key_space() {
        let trending = CacheKey::Trending {
            kind: MediaKind::Movie,
            window: TimeWindow::Day,
            page: 1,
        };
        let ids = CacheKey::ExternalIds(MediaKey::new(1, MediaKind::Tv));

        assert_eq!(trending.ttl(), 600);
        assert_eq!(CacheKey::Genres(MediaKind::Movie).ttl(), 86400);
        assert!(ids.ttl() > trending.ttl());
        assert!(ids.to_string().starts_with(ids.space()));
    }

    #[test]
    fn test_write_tally_counts_per_space() {
        let mut tally = WriteTally::default();
        tally.record("trending", true);
        tally.record("trending", true);
        tally.record("genres", false);
        tally.record("extids", true);

        assert_eq!(tally.total_written(), 3);
        assert_eq!(tally.total_failed(), 1);
        assert_eq!(tally.written.get("trending"), Some(&2));
        assert_eq!(tally.failed.get("genres"), Some(&1));
        assert_eq!(tally.written.get("genres"), None);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_cache_miss() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let key = CacheKey::Genres(MediaKind::Movie);
        let mut conn = cache
            .redis_client
            .get_multiplexed_async_connection()
            .await
            .unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_writer_flushes_on_shutdown() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client.clone()).await;

        let key = CacheKey::Search {
            kind: MediaKind::Movie,
            query: "queue-hub-shutdown-test".to_string(),
            page: 1,
        };
        let value = vec!["flushed".to_string()];

        cache.set_in_background(&key, &value);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
