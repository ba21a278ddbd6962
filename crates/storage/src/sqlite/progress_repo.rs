use learn_core::model::ProgressRecord;
use sqlx::{QueryBuilder, Sqlite};

use super::{
    SqliteRepository,
    mapping::{counter_to_i64, map_progress_row},
};
use crate::repository::{ProgressQuery, ProgressRepository, ProgressWriter, StorageError};

const PROGRESS_COLUMNS: &str =
    "user_id, word_id, proficiency_level, times_practiced, correct_count, last_practiced";

/// Translate a `ProgressQuery` into a parameterised SELECT.
///
/// Every column is selected regardless of projection; rows are narrow.
pub(crate) fn build_select(query: &ProgressQuery) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {PROGRESS_COLUMNS} FROM word_progress WHERE user_id = "
    ));
    qb.push_bind(query.learner_id().as_str().to_owned());

    if let Some(ids) = query.item_ids() {
        qb.push(" AND word_id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str().to_owned());
        }
        separated.push_unseparated(")");
    }

    if let Some(level) = query.level() {
        qb.push(" AND proficiency_level = ");
        qb.push_bind(level.as_str());
    }

    if query.newest_first() {
        qb.push(" ORDER BY last_practiced DESC, word_id ASC");
    } else {
        qb.push(" ORDER BY word_id ASC");
    }
    qb
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn fetch_progress(
        &self,
        query: &ProgressQuery,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        // `IN ()` is a syntax error in SQLite.
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut qb = build_select(query);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ProgressWriter for SqliteRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO word_progress (
                user_id, word_id, proficiency_level,
                times_practiced, correct_count, last_practiced
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, word_id) DO UPDATE SET
                proficiency_level = excluded.proficiency_level,
                times_practiced = excluded.times_practiced,
                correct_count = excluded.correct_count,
                last_practiced = excluded.last_practiced
            ",
        )
        .bind(record.learner_id.as_str())
        .bind(record.item_id.as_str())
        .bind(record.level.as_str())
        .bind(counter_to_i64(record.times_practiced))
        .bind(counter_to_i64(record.correct_count))
        .bind(record.last_practiced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
