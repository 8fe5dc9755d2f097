//! Client-side data core: batch clients, query cache, aggregation,
//! watch-later membership and the infinite grid.
//!
//! Everything here is constructed explicitly and passed where needed; there
//! is no global state.

pub mod aggregate;
pub mod grid;
pub mod http;
pub mod loader;
pub mod query_cache;
pub mod retry;
pub mod watch_later;

pub use aggregate::aggregate;
pub use grid::{GridController, GridLayout, GridWindow, InfiniteGrid, LoadState, RowRange, TrendingPages};
pub use http::{ApiClient, BatchSource, PageSource, WatchLaterBackend};
pub use loader::MediaDataLoader;
pub use query_cache::{Freshness, QueryCache, QueryKey, QueryState, Subscription};
pub use retry::RetryPolicy;
pub use watch_later::{SyncStatus, WatchLaterStore, WatchLaterSync};
