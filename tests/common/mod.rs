//! In-memory stand-ins for the provider and the repositories, plus helpers
//! to run the router in-process.

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use axum::Router;
use chrono::Utc;
use tokio::sync::RwLock;

use queue_hub::{
    db::{ReferenceRepository, WatchLaterRepository},
    error::{AppError, AppResult},
    models::{
        ExternalIdRecord, Genre, MediaItem, MediaKey, MediaKind, Page, RatingRecord,
        RuntimeRecord, TimeWindow, WatchLaterEntry,
    },
    routes::{create_router, AppState, BatchSettings},
    services::MetadataProvider,
};

pub const PAGE_SIZE: u64 = 20;
pub const TOTAL_PAGES: u32 = 3;
pub const MAX_BATCH_SIZE: usize = 5;

/// Provider id the fake does not know (404 upstream)
pub const UNKNOWN_ID: u64 = 404;
/// Provider id whose lookup fails outright
pub const FAILING_ID: u64 = 500;
/// External id whose rating lookup fails outright
pub const FAILING_EXTERNAL_ID: &str = "tt9999999";

pub fn imdb(id: u64) -> String {
    format!("tt{:07}", id)
}

pub fn media_item(id: u64, kind: MediaKind) -> MediaItem {
    MediaItem {
        id,
        kind,
        title: format!("Title {}", id),
        poster_path: Some(format!("/poster-{}.jpg", id)),
        release_date: None,
        vote_average: 7.0,
        genre_ids: vec![18],
    }
}

fn external_number(external_id: &str) -> Option<u64> {
    external_id.strip_prefix("tt")?.parse().ok()
}

/// Three pages of trending titles. Every title has an IMDb id except
/// multiples of 10.
pub struct FakeProvider;

#[async_trait::async_trait]
impl MetadataProvider for FakeProvider {
    async fn trending(
        &self,
        kind: MediaKind,
        _window: TimeWindow,
        page: u32,
    ) -> AppResult<Page<MediaItem>> {
        if page == 0 || page > TOTAL_PAGES {
            return Err(AppError::InvalidInput(format!("Page {} out of range", page)));
        }

        let first = u64::from(page - 1) * PAGE_SIZE + 1;
        Ok(Page {
            page,
            total_pages: TOTAL_PAGES,
            total_results: u64::from(TOTAL_PAGES) * PAGE_SIZE,
            results: (first..first + PAGE_SIZE)
                .map(|id| media_item(id, kind))
                .collect(),
        })
    }

    async fn search(&self, kind: MediaKind, query: &str, page: u32) -> AppResult<Page<MediaItem>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let mut item = media_item(550, kind);
        item.title = query.to_string();
        Ok(Page {
            page,
            total_pages: 1,
            total_results: 1,
            results: vec![item],
        })
    }

    async fn external_ids(&self, key: MediaKey) -> AppResult<Option<ExternalIdRecord>> {
        match key.id {
            UNKNOWN_ID => Ok(None),
            FAILING_ID => Err(AppError::ExternalApi("upstream timeout".to_string())),
            id => Ok(Some(ExternalIdRecord {
                id,
                kind: key.kind,
                external_id: (id % 10 != 0).then(|| imdb(id)),
            })),
        }
    }

    async fn genres(&self, _kind: MediaKind) -> AppResult<Vec<Genre>> {
        Ok(vec![
            Genre {
                id: 18,
                name: "Drama".to_string(),
            },
            Genre {
                id: 35,
                name: "Comedy".to_string(),
            },
        ])
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Runtime `60 + n` for every `tt{n}` except multiples of 3, which are
/// absent. Rating `n / 10` for every id except [`FAILING_EXTERNAL_ID`].
pub struct FakeReferences;

#[async_trait::async_trait]
impl ReferenceRepository for FakeReferences {
    async fn runtime(&self, external_id: &str) -> AppResult<Option<RuntimeRecord>> {
        let Some(n) = external_number(external_id) else {
            return Ok(None);
        };
        if n % 3 == 0 {
            return Ok(None);
        }

        Ok(Some(RuntimeRecord {
            external_id: external_id.to_string(),
            title_type: Some("movie".to_string()),
            primary_title: Some(format!("Title {}", n)),
            runtime_minutes: u32::try_from(60 + n).ok(),
        }))
    }

    async fn rating(&self, external_id: &str) -> AppResult<Option<RatingRecord>> {
        if external_id == FAILING_EXTERNAL_ID {
            return Err(AppError::Internal("ratings table unavailable".to_string()));
        }

        Ok(external_number(external_id).map(|n| RatingRecord {
            external_id: external_id.to_string(),
            average_rating: Some(n as f32 / 10.0),
            num_votes: Some(1000),
        }))
    }
}

#[derive(Default)]
pub struct InMemoryWatchLater {
    entries: RwLock<HashMap<String, Vec<WatchLaterEntry>>>,
}

#[async_trait::async_trait]
impl WatchLaterRepository for InMemoryWatchLater {
    async fn list(&self, user_id: &str) -> AppResult<Vec<WatchLaterEntry>> {
        let entries = self.entries.read().await;
        let mut list = entries.get(user_id).cloned().unwrap_or_default();
        list.reverse();
        Ok(list)
    }

    async fn add(&self, user_id: &str, key: MediaKey) -> AppResult<WatchLaterEntry> {
        let mut entries = self.entries.write().await;
        let list = entries.entry(user_id.to_string()).or_default();

        if let Some(existing) = list.iter().find(|entry| entry.key() == key) {
            return Ok(existing.clone());
        }

        let entry = WatchLaterEntry {
            media_id: key.id,
            media_type: key.kind,
            added_at: Utc::now(),
        };
        list.push(entry.clone());
        Ok(entry)
    }

    async fn remove(&self, user_id: &str, key: MediaKey) -> AppResult<bool> {
        let mut entries = self.entries.write().await;
        let Some(list) = entries.get_mut(user_id) else {
            return Ok(false);
        };

        let before = list.len();
        list.retain(|entry| entry.key() != key);
        Ok(list.len() != before)
    }
}

pub fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        provider: Arc::new(FakeProvider),
        references: Arc::new(FakeReferences),
        watch_later: Arc::new(InMemoryWatchLater::default()),
        batch: BatchSettings {
            concurrency: 4,
            max_size: MAX_BATCH_SIZE,
        },
    })
}

pub fn test_router() -> Router {
    create_router(test_state())
}

/// Serves the router on an ephemeral port and returns its origin
pub async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let address = listener.local_addr().expect("local address");

    tokio::spawn(async move {
        axum::serve(listener, test_router())
            .await
            .expect("test server");
    });

    format!("http://{}", address)
}
