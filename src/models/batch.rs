use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::media::{MediaKey, MediaKind};

static EXTERNAL_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tt\d{7,10}$").expect("external id pattern is valid"));

/// Checks an IMDb-style external identifier (e.g. "tt0137523")
pub fn is_valid_external_id(id: &str) -> bool {
    EXTERNAL_ID_PATTERN.is_match(id)
}

/// Secondary identifier of a catalogue item, used to join the runtime and
/// rating reference data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdRecord {
    pub id: u64,
    pub kind: MediaKind,
    pub external_id: Option<String>,
}

impl ExternalIdRecord {
    /// Placeholder for an item the provider could not resolve
    pub fn missing(key: MediaKey) -> Self {
        Self {
            id: key.id,
            kind: key.kind,
            external_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    pub external_id: String,
    pub title_type: Option<String>,
    pub primary_title: Option<String>,
    pub runtime_minutes: Option<u32>,
}

impl RuntimeRecord {
    /// Placeholder keeping a batch response structurally complete
    pub fn missing(external_id: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            title_type: None,
            primary_title: None,
            runtime_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub external_id: String,
    pub average_rating: Option<f32>,
    pub num_votes: Option<u32>,
}

impl RatingRecord {
    /// Placeholder keeping a batch response structurally complete
    pub fn missing(external_id: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            average_rating: None,
            num_votes: None,
        }
    }
}

/// Per-item merge of the three batch lookups.
///
/// `None` means the part could not be resolved; it is never a guessed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMediaData {
    pub external_ids: Option<ExternalIdRecord>,
    pub runtime: Option<RuntimeRecord>,
    pub rating: Option<RatingRecord>,
}

impl AggregatedMediaData {
    pub fn external_id(&self) -> Option<&str> {
        self.external_ids
            .as_ref()
            .and_then(|record| record.external_id.as_deref())
    }

    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime.as_ref().and_then(|r| r.runtime_minutes)
    }

    pub fn average_rating(&self) -> Option<f32> {
        self.rating.as_ref().and_then(|r| r.average_rating)
    }
}

/// Body of `POST /batch/external-ids`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalIdsBatchRequest {
    pub ids: Vec<u64>,
    #[serde(default)]
    pub kind: Option<MediaKind>,
}

/// Body of `POST /batch/runtime` and `POST /batch/rating`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalKeyBatchRequest {
    pub ids: Vec<String>,
}

/// Batch endpoint envelope. `data` matches the request's order and length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse<T> {
    pub data: Vec<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T> BatchResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }
}
