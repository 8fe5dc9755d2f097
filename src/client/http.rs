//! HTTP client for the Queue Hub API.
//!
//! Implements the three batch fetch clients, the trending page source and the
//! watch-later backend on top of `reqwest`. None of these retry: retries are
//! owned by the query cache wrapping each call.

use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::FetchError,
    middleware::USER_ID_HEADER,
    models::{
        is_valid_external_id, BatchResponse, ExternalIdRecord, ExternalIdsBatchRequest,
        ExternalKeyBatchRequest, MediaItem, MediaKey, MediaKind, Page, RatingRecord,
        RuntimeRecord, TimeWindow, WatchLaterEntry, WatchLaterRequest,
    },
};

/// The three batch lookups.
///
/// Each returns exactly one record per input key, in input order.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BatchSource: Send + Sync {
    async fn external_ids(
        &self,
        ids: Vec<u64>,
        kind: MediaKind,
    ) -> Result<Vec<ExternalIdRecord>, FetchError>;

    async fn runtimes(&self, ids: Vec<String>) -> Result<Vec<RuntimeRecord>, FetchError>;

    async fn ratings(&self, ids: Vec<String>) -> Result<Vec<RatingRecord>, FetchError>;
}

/// One page of a growing collection, 1-based
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn page(&self, page: u32) -> Result<Page<MediaItem>, FetchError>;
}

/// Server side of the watch-later list for the signed-in user
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WatchLaterBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<WatchLaterEntry>, FetchError>;

    async fn add(&self, key: MediaKey) -> Result<(), FetchError>;

    async fn remove(&self, key: MediaKey) -> Result<(), FetchError>;
}

/// Error body rendered by the API for non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

fn validate_external_ids(ids: &[String]) -> Result<(), FetchError> {
    match ids.iter().find(|id| !is_valid_external_id(id)) {
        Some(invalid) => Err(FetchError::Validation(format!(
            "Invalid external id '{}'",
            invalid
        ))),
        None => Ok(()),
    }
}

fn check_cardinality<T>(operation: &str, expected: usize, data: Vec<T>) -> Result<Vec<T>, FetchError> {
    if data.len() != expected {
        return Err(FetchError::Decode(format!(
            "{} batch returned {} records for {} keys",
            operation,
            data.len(),
            expected
        )));
    }
    Ok(data)
}

async fn error_from_response(response: Response) -> FetchError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error)
        .unwrap_or(body);

    FetchError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Queue Hub API client
#[derive(Clone)]
pub struct ApiClient {
    http_client: HttpClient,
    base_url: String,
    user_id: Option<String>,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
        }
    }

    /// Identifies the signed-in user for the watch-later endpoints
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user_id {
            Some(user_id) => request.header(USER_ID_HEADER, user_id),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let error = error_from_response(response).await;
            tracing::debug!(error = %error, "API request failed");
            return Err(error);
        }
        Ok(response)
    }

    async fn post_batch<B, T>(&self, path: &str, body: &B) -> Result<Vec<T>, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http_client.post(self.url(path)).json(body);
        let response: BatchResponse<T> = self.send(request).await?.json().await?;
        Ok(response.data)
    }

    /// A page of trending titles
    pub async fn trending(
        &self,
        kind: MediaKind,
        window: TimeWindow,
        page: u32,
    ) -> Result<Page<MediaItem>, FetchError> {
        let request = self
            .http_client
            .get(self.url(&format!("/trending/{}", kind)))
            .query(&[("page", page.to_string()), ("window", window.to_string())]);
        Ok(self.send(request).await?.json().await?)
    }
}

#[async_trait::async_trait]
impl BatchSource for ApiClient {
    async fn external_ids(
        &self,
        ids: Vec<u64>,
        kind: MediaKind,
    ) -> Result<Vec<ExternalIdRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let expected = ids.len();
        let body = ExternalIdsBatchRequest {
            ids,
            kind: Some(kind),
        };
        let data = self.post_batch("/batch/external-ids", &body).await?;
        check_cardinality("external-ids", expected, data)
    }

    async fn runtimes(&self, ids: Vec<String>) -> Result<Vec<RuntimeRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        validate_external_ids(&ids)?;

        let expected = ids.len();
        let data = self
            .post_batch("/batch/runtime", &ExternalKeyBatchRequest { ids })
            .await?;
        check_cardinality("runtime", expected, data)
    }

    async fn ratings(&self, ids: Vec<String>) -> Result<Vec<RatingRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        validate_external_ids(&ids)?;

        let expected = ids.len();
        let data = self
            .post_batch("/batch/rating", &ExternalKeyBatchRequest { ids })
            .await?;
        check_cardinality("rating", expected, data)
    }
}

#[async_trait::async_trait]
impl WatchLaterBackend for ApiClient {
    async fn list(&self) -> Result<Vec<WatchLaterEntry>, FetchError> {
        let request = self.authorized(self.http_client.get(self.url("/watch-later")));
        Ok(self.send(request).await?.json().await?)
    }

    async fn add(&self, key: MediaKey) -> Result<(), FetchError> {
        let request = self.authorized(
            self.http_client
                .post(self.url("/watch-later"))
                .json(&WatchLaterRequest::from(key)),
        );
        self.send(request).await?;
        Ok(())
    }

    async fn remove(&self, key: MediaKey) -> Result<(), FetchError> {
        let request = self.authorized(
            self.http_client
                .delete(self.url("/watch-later"))
                .json(&WatchLaterRequest::from(key)),
        );
        self.send(request).await?;
        Ok(())
    }
}
