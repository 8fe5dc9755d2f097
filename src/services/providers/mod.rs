/// Movie metadata provider abstraction
///
/// The provider is an opaque external service. The server only needs paged
/// listings for the grid, external ids for the batch endpoint and the genre
/// reference list.
use crate::{
    error::AppResult,
    models::{ExternalIdRecord, Genre, MediaItem, MediaKey, MediaKind, Page, TimeWindow},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Trending titles of one kind, paginated
    async fn trending(
        &self,
        kind: MediaKind,
        window: TimeWindow,
        page: u32,
    ) -> AppResult<Page<MediaItem>>;

    /// Search titles of one kind by name, paginated
    async fn search(&self, kind: MediaKind, query: &str, page: u32) -> AppResult<Page<MediaItem>>;

    /// External (IMDb) id of a title
    ///
    /// Returns `Ok(None)` when the provider does not know the title; errors are
    /// reserved for failed lookups.
    async fn external_ids(&self, key: MediaKey) -> AppResult<Option<ExternalIdRecord>>;

    async fn genres(&self, kind: MediaKind) -> AppResult<Vec<Genre>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
