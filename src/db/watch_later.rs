use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::{MediaKey, WatchLaterEntry},
};

/// Persistence of per-user watch-later membership
///
/// `(user_id, media_id, media_type)` is unique: adding an existing entry is a
/// no-op that returns the stored row.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WatchLaterRepository: Send + Sync {
    /// All entries for a user, most recently added first
    async fn list(&self, user_id: &str) -> AppResult<Vec<WatchLaterEntry>>;

    async fn add(&self, user_id: &str, key: MediaKey) -> AppResult<WatchLaterEntry>;

    /// Returns whether an entry was actually removed
    async fn remove(&self, user_id: &str, key: MediaKey) -> AppResult<bool>;
}

#[derive(Debug, sqlx::FromRow)]
struct WatchLaterRow {
    media_id: i64,
    media_type: String,
    added_at: DateTime<Utc>,
}

impl TryFrom<WatchLaterRow> for WatchLaterEntry {
    type Error = AppError;

    fn try_from(row: WatchLaterRow) -> Result<Self, Self::Error> {
        let media_id = u64::try_from(row.media_id)
            .map_err(|_| AppError::Internal(format!("Negative media id {}", row.media_id)))?;
        let media_type = row.media_type.parse().map_err(AppError::Internal)?;

        Ok(WatchLaterEntry {
            media_id,
            media_type,
            added_at: row.added_at,
        })
    }
}

fn to_db_id(key: MediaKey) -> AppResult<i64> {
    i64::try_from(key.id).map_err(|_| AppError::InvalidInput(format!("Media id {} out of range", key.id)))
}

pub struct PgWatchLaterRepository {
    pool: PgPool,
}

impl PgWatchLaterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WatchLaterRepository for PgWatchLaterRepository {
    async fn list(&self, user_id: &str) -> AppResult<Vec<WatchLaterEntry>> {
        let rows = sqlx::query_as::<_, WatchLaterRow>(
            r#"
            SELECT media_id, media_type, added_at
            FROM watch_later
            WHERE user_id = $1
            ORDER BY added_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WatchLaterEntry::try_from).collect()
    }

    async fn add(&self, user_id: &str, key: MediaKey) -> AppResult<WatchLaterEntry> {
        // DO UPDATE (rather than DO NOTHING) so RETURNING yields the existing row
        let row = sqlx::query_as::<_, WatchLaterRow>(
            r#"
            INSERT INTO watch_later (user_id, media_id, media_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, media_id, media_type)
            DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING media_id, media_type, added_at
            "#,
        )
        .bind(user_id)
        .bind(to_db_id(key)?)
        .bind(key.kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user_id = %user_id, media = %key, "Watch-later entry stored");

        row.try_into()
    }

    async fn remove(&self, user_id: &str, key: MediaKey) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM watch_later
            WHERE user_id = $1 AND media_id = $2 AND media_type = $3
            "#,
        )
        .bind(user_id)
        .bind(to_db_id(key)?)
        .bind(key.kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;

    #[test]
    fn test_row_conversion() {
        let added_at = Utc::now();
        let row = WatchLaterRow {
            media_id: 1399,
            media_type: "tv".to_string(),
            added_at,
        };

        let entry = WatchLaterEntry::try_from(row).unwrap();
        assert_eq!(entry.key(), MediaKey::new(1399, MediaKind::Tv));
        assert_eq!(entry.added_at, added_at);
    }

    #[test]
    fn test_row_conversion_rejects_unknown_kind() {
        let row = WatchLaterRow {
            media_id: 1,
            media_type: "person".to_string(),
            added_at: Utc::now(),
        };
        assert!(WatchLaterEntry::try_from(row).is_err());
    }

    #[test]
    fn test_row_conversion_rejects_negative_id() {
        let row = WatchLaterRow {
            media_id: -5,
            media_type: "movie".to_string(),
            added_at: Utc::now(),
        };
        assert!(WatchLaterEntry::try_from(row).is_err());
    }

    #[test]
    fn test_db_id_out_of_range() {
        assert!(to_db_id(MediaKey::new(u64::MAX, MediaKind::Movie)).is_err());
        assert_eq!(to_db_id(MediaKey::new(550, MediaKind::Movie)).unwrap(), 550);
    }
}
