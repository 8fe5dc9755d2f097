use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::{MediaKey, MediaKind};

/// A title the user intends to watch later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchLaterEntry {
    pub media_id: u64,
    pub media_type: MediaKind,
    pub added_at: DateTime<Utc>,
}

impl WatchLaterEntry {
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.media_id, self.media_type)
    }
}

/// Body of watch-later `POST` and `DELETE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchLaterRequest {
    pub media_id: u64,
    pub media_type: MediaKind,
}

impl WatchLaterRequest {
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.media_id, self.media_type)
    }
}

impl From<MediaKey> for WatchLaterRequest {
    fn from(key: MediaKey) -> Self {
        Self {
            media_id: key.id,
            media_type: key.kind,
        }
    }
}
