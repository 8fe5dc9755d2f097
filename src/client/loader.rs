use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    client::{
        aggregate::aggregate,
        http::BatchSource,
        query_cache::{Freshness, QueryCache, QueryKey},
    },
    error::FetchError,
    models::{
        is_valid_external_id, AggregatedMediaData, ExternalIdRecord, MediaItem, MediaKey,
        MediaKind, RatingRecord, RuntimeRecord,
    },
};

pub const EXTERNAL_IDS_QUERY: &str = "external-ids";
pub const RUNTIME_QUERY: &str = "runtime";
pub const RATING_QUERY: &str = "rating";

/// Cached batch lookups feeding the aggregation step.
///
/// Each batch call is keyed by its ordered argument list, so the same page of
/// items always hits the same cache entries.
#[derive(Clone)]
pub struct MediaDataLoader {
    source: Arc<dyn BatchSource>,
    cache: QueryCache,
}

impl MediaDataLoader {
    pub fn new(source: Arc<dyn BatchSource>, cache: QueryCache) -> Self {
        Self { source, cache }
    }

    pub async fn external_ids(
        &self,
        ids: Vec<u64>,
        kind: MediaKind,
    ) -> Result<Vec<ExternalIdRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let key = QueryKey::new(EXTERNAL_IDS_QUERY, &(kind, &ids))?;
        let source = self.source.clone();
        self.cache
            .fetch_query(key, Freshness::VeryLong, move || {
                let source = source.clone();
                let ids = ids.clone();
                async move { source.external_ids(ids, kind).await }
            })
            .await
    }

    pub async fn runtimes(&self, ids: Vec<String>) -> Result<Vec<RuntimeRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let key = QueryKey::new(RUNTIME_QUERY, &ids)?;
        let source = self.source.clone();
        self.cache
            .fetch_query(key, Freshness::Long, move || {
                let source = source.clone();
                let ids = ids.clone();
                async move { source.runtimes(ids).await }
            })
            .await
    }

    pub async fn ratings(&self, ids: Vec<String>) -> Result<Vec<RatingRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let key = QueryKey::new(RATING_QUERY, &ids)?;
        let source = self.source.clone();
        self.cache
            .fetch_query(key, Freshness::Long, move || {
                let source = source.clone();
                let ids = ids.clone();
                async move { source.ratings(ids).await }
            })
            .await
    }

    /// Resolves external ids, then runtimes and ratings, for `items` and merges
    /// them into one record per item.
    ///
    /// Items are grouped by kind since provider ids are only unique per kind.
    /// A failed batch contributes nothing for this cycle; it never fails the load.
    pub async fn load(&self, items: &[MediaItem]) -> HashMap<MediaKey, AggregatedMediaData> {
        let (movies, shows) = tokio::join!(
            self.load_kind(MediaKind::Movie, items),
            self.load_kind(MediaKind::Tv, items),
        );

        let mut merged = movies;
        merged.extend(shows);
        merged
    }

    async fn load_kind(
        &self,
        kind: MediaKind,
        items: &[MediaItem],
    ) -> HashMap<MediaKey, AggregatedMediaData> {
        let group: Vec<MediaItem> = items
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect();
        if group.is_empty() {
            return HashMap::new();
        }

        let ids = group.iter().map(|item| item.id).collect();
        let external_ids =
            absent_on_error(self.external_ids(ids, kind).await, EXTERNAL_IDS_QUERY);

        let mut seen = HashSet::new();
        let keys: Vec<String> = external_ids
            .iter()
            .flatten()
            .filter_map(|record| record.external_id.clone())
            .filter(|id| is_valid_external_id(id) && seen.insert(id.clone()))
            .collect();

        let (runtimes, ratings) = tokio::join!(self.runtimes(keys.clone()), self.ratings(keys));
        let runtimes = absent_on_error(runtimes, RUNTIME_QUERY);
        let ratings = absent_on_error(ratings, RATING_QUERY);

        tracing::debug!(
            kind = %kind,
            items = group.len(),
            external_ids = external_ids.is_some(),
            runtimes = runtimes.is_some(),
            ratings = ratings.is_some(),
            "Media data loaded"
        );

        aggregate(
            &group,
            external_ids.as_deref(),
            runtimes.as_deref(),
            ratings.as_deref(),
        )
    }
}

fn absent_on_error<T>(result: Result<T, FetchError>, batch: &'static str) -> Option<T> {
    match result {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::warn!(batch, error = %e, "Batch failed, treating its data as absent");
            None
        }
    }
}
