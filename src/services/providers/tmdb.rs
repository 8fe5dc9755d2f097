/// TMDB (The Movie Database) provider
///
/// Uses TMDB API v3 with `api_key` query authentication:
/// 1. Listings: /trending/{kind}/{window}, /search/{kind}
/// 2. External ids: /{kind}/{id}/external_ids → IMDb id
/// 3. Reference data: /genre/{kind}/list
///
/// Every call reads through the Redis cache.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{ExternalIdRecord, Genre, MediaItem, MediaKey, MediaKind, Page, TimeWindow},
    services::providers::MetadataProvider,
};
use chrono::NaiveDate;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

/// TMDB refuses to serve pages beyond this, whatever `total_pages` claims
const MAX_PAGE: u32 = 500;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

/// Error envelope TMDB attaches to non-2xx responses
#[derive(Debug, Deserialize)]
struct TmdbErrorEnvelope {
    status_message: String,
}

#[derive(Debug, Deserialize)]
struct TmdbPage {
    page: u32,
    total_pages: u32,
    total_results: u64,
    #[serde(default)]
    results: Vec<TmdbResult>,
}

/// Listing entry. Movies carry `title`/`release_date`, shows `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
struct TmdbResult {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    vote_average: f32,
    #[serde(default)]
    genre_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenreList {
    genres: Vec<Genre>,
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn to_media_item(result: TmdbResult, kind: MediaKind) -> MediaItem {
    let title = result
        .title
        .or(result.name)
        .unwrap_or_else(|| "Untitled".to_string());
    let release_date = parse_date(
        result
            .release_date
            .as_deref()
            .or(result.first_air_date.as_deref()),
    );

    MediaItem {
        id: result.id,
        kind,
        title,
        poster_path: result.poster_path,
        release_date,
        vote_average: result.vote_average,
        genre_ids: result.genre_ids,
    }
}

fn to_page(raw: TmdbPage, kind: MediaKind) -> Page<MediaItem> {
    Page {
        page: raw.page,
        total_pages: raw.total_pages.min(MAX_PAGE),
        total_results: raw.total_results,
        results: raw
            .results
            .into_iter()
            .map(|r| to_media_item(r, kind))
            .collect(),
    }
}

fn error_from_status(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<TmdbErrorEnvelope>(body)
        .map(|envelope| envelope.status_message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(message),
        _ => AppError::ExternalApi(format!("TMDB returned status {}: {}", status, message)),
    }
}

fn validate_page(page: u32) -> AppResult<()> {
    if page == 0 || page > MAX_PAGE {
        return Err(AppError::InvalidInput(format!(
            "Page must be between 1 and {}",
            MAX_PAGE
        )));
    }
    Ok(())
}

impl TmdbProvider {
    pub fn new(cache: Cache, api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);
        tracing::debug!(url = %url, "TMDB request");

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = %status, "TMDB request failed");
            return Err(error_from_status(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn trending(
        &self,
        kind: MediaKind,
        window: TimeWindow,
        page: u32,
    ) -> AppResult<Page<MediaItem>> {
        validate_page(page)?;

        cached!(
            self.cache,
            CacheKey::Trending { kind, window, page },
            async move {
                let raw: TmdbPage = self
                    .get_json(
                        &format!("/trending/{}/{}", kind, window),
                        &[("page", page.to_string())],
                    )
                    .await?;
                let page = to_page(raw, kind);

                tracing::info!(
                    kind = %kind,
                    page = page.page,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Trending page fetched"
                );

                Ok::<_, AppError>(page)
            }
        )
    }

    async fn search(&self, kind: MediaKind, query: &str, page: u32) -> AppResult<Page<MediaItem>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }
        validate_page(page)?;

        cached!(
            self.cache,
            CacheKey::Search {
                kind,
                query: query.to_string(),
                page,
            },
            async move {
                let raw: TmdbPage = self
                    .get_json(
                        &format!("/search/{}", kind),
                        &[("query", query.trim().to_string()), ("page", page.to_string())],
                    )
                    .await?;
                let page = to_page(raw, kind);

                tracing::info!(
                    query = %query,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Title search completed"
                );

                Ok::<_, AppError>(page)
            }
        )
    }

    async fn external_ids(&self, key: MediaKey) -> AppResult<Option<ExternalIdRecord>> {
        cached!(
            self.cache,
            CacheKey::ExternalIds(key),
            async move {
                let path = format!("/{}/{}/external_ids", key.kind, key.id);
                match self.get_json::<TmdbExternalIds>(&path, &[]).await {
                    Ok(ids) => Ok(Some(ExternalIdRecord {
                        id: key.id,
                        kind: key.kind,
                        external_id: ids.imdb_id.filter(|id| !id.is_empty()),
                    })),
                    Err(AppError::NotFound(_)) => {
                        tracing::debug!(media = %key, "Title unknown to TMDB");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        )
    }

    async fn genres(&self, kind: MediaKind) -> AppResult<Vec<Genre>> {
        cached!(
            self.cache,
            CacheKey::Genres(kind),
            async move {
                let list: TmdbGenreList = self
                    .get_json(&format!("/genre/{}/list", kind), &[])
                    .await?;
                Ok::<_, AppError>(list.genres)
            }
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
