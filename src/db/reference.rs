use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{RatingRecord, RuntimeRecord},
};

/// Runtime and rating reference data keyed by external (IMDb) id
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// `None` when the reference table has no row for the id
    async fn runtime(&self, external_id: &str) -> AppResult<Option<RuntimeRecord>>;

    /// `None` when the reference table has no row for the id
    async fn rating(&self, external_id: &str) -> AppResult<Option<RatingRecord>>;
}

#[derive(Debug, sqlx::FromRow)]
struct TitleBasicsRow {
    tconst: String,
    title_type: Option<String>,
    primary_title: Option<String>,
    runtime_minutes: Option<i32>,
}

impl From<TitleBasicsRow> for RuntimeRecord {
    fn from(row: TitleBasicsRow) -> Self {
        Self {
            external_id: row.tconst,
            title_type: row.title_type,
            primary_title: row.primary_title,
            runtime_minutes: row.runtime_minutes.and_then(|m| u32::try_from(m).ok()),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TitleRatingsRow {
    tconst: String,
    average_rating: Option<f32>,
    num_votes: Option<i32>,
}

impl From<TitleRatingsRow> for RatingRecord {
    fn from(row: TitleRatingsRow) -> Self {
        Self {
            external_id: row.tconst,
            average_rating: row.average_rating,
            num_votes: row.num_votes.and_then(|v| u32::try_from(v).ok()),
        }
    }
}

pub struct PgReferenceRepository {
    pool: PgPool,
}

impl PgReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReferenceRepository for PgReferenceRepository {
    async fn runtime(&self, external_id: &str) -> AppResult<Option<RuntimeRecord>> {
        let row = sqlx::query_as::<_, TitleBasicsRow>(
            r#"
            SELECT tconst, title_type, primary_title, runtime_minutes
            FROM title_basics
            WHERE tconst = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RuntimeRecord::from))
    }

    async fn rating(&self, external_id: &str) -> AppResult<Option<RatingRecord>> {
        let row = sqlx::query_as::<_, TitleRatingsRow>(
            r#"
            SELECT tconst, average_rating, num_votes
            FROM title_ratings
            WHERE tconst = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RatingRecord::from))
    }
}
