pub mod postgres;
pub mod redis;
pub mod reference;
pub mod watch_later;

pub use postgres::{create_pool, run_migrations};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use redis::CacheWriterHandle;
pub use reference::{PgReferenceRepository, ReferenceRepository};
pub use watch_later::{PgWatchLaterRepository, WatchLaterRepository};
