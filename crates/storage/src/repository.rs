use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use learn_core::model::{ItemId, LearnerId, ProficiencyLevel, ProgressRecord};
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("remote error: {0}")]
    Remote(RemoteError),
}

/// Error reported by a hosted backend, with whatever diagnostics the
/// provider attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    #[serde(skip)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "[{status}] ")?;
        }
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

//
// ─── QUERY CONTRACT ────────────────────────────────────────────────────────────
//

/// Which fields a query needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    /// Item id and proficiency level only. Adapters may leave the counters at
    /// zero and the timestamp at the epoch.
    Status,
    #[default]
    Full,
}

/// Filtered read over the per-learner progress table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressQuery {
    learner_id: LearnerId,
    item_ids: Option<BTreeSet<ItemId>>,
    level: Option<ProficiencyLevel>,
    projection: Projection,
    newest_first: bool,
}

impl ProgressQuery {
    #[must_use]
    pub fn for_learner(learner_id: LearnerId) -> Self {
        Self {
            learner_id,
            item_ids: None,
            level: None,
            projection: Projection::Full,
            newest_first: false,
        }
    }

    /// Restrict to items in the given set. An empty set matches nothing.
    #[must_use]
    pub fn with_items<I>(mut self, item_ids: I) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        self.item_ids = Some(item_ids.into_iter().collect());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: ProficiencyLevel) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    #[must_use]
    pub fn order_by_last_practiced_desc(mut self) -> Self {
        self.newest_first = true;
        self
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn item_ids(&self) -> Option<&BTreeSet<ItemId>> {
        self.item_ids.as_ref()
    }

    #[must_use]
    pub fn level(&self) -> Option<ProficiencyLevel> {
        self.level
    }

    #[must_use]
    pub fn projection(&self) -> Projection {
        self.projection
    }

    #[must_use]
    pub fn newest_first(&self) -> bool {
        self.newest_first
    }

    /// True when the item filter is present but empty, so no row can match.
    #[must_use]
    pub fn matches_nothing(&self) -> bool {
        self.item_ids.as_ref().is_some_and(BTreeSet::is_empty)
    }

    /// Evaluate the filters against a single record.
    #[must_use]
    pub fn matches(&self, record: &ProgressRecord) -> bool {
        record.learner_id == self.learner_id
            && self
                .item_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&record.item_id))
            && self.level.is_none_or(|level| record.level == level)
    }
}

/// Read side of the progress table.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch every record matching the query, honouring its ordering.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot answer the query.
    async fn fetch_progress(
        &self,
        query: &ProgressQuery,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Write side used by practice flows and seeding.
#[async_trait]
pub trait ProgressWriter: Send + Sync {
    /// Insert or replace the record for its (learner, item) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<HashMap<(LearnerId, ItemId), ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn fetch_progress(
        &self,
        query: &ProgressQuery,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        if query.matches_nothing() {
            return Ok(Vec::new());
        }
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<ProgressRecord> = guard
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        drop(guard);

        if query.newest_first() {
            found.sort_by(|a, b| {
                b.last_practiced_at
                    .cmp(&a.last_practiced_at)
                    .then_with(|| a.item_id.cmp(&b.item_id))
            });
        } else {
            found.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        }
        Ok(found)
    }
}

#[async_trait]
impl ProgressWriter for InMemoryRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (record.learner_id.clone(), record.item_id.clone()),
            record.clone(),
        );
        Ok(())
    }
}

/// Aggregates the progress read and write sides behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub writer: Arc<dyn ProgressWriter>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let writer: Arc<dyn ProgressWriter> = Arc::new(repo);
        Self { progress, writer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use learn_core::time::fixed_now;

    fn learner(raw: &str) -> LearnerId {
        LearnerId::new(raw).unwrap()
    }

    fn item(raw: &str) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn record(
        learner_id: &str,
        item_id: &str,
        level: ProficiencyLevel,
        days_ago: i64,
    ) -> ProgressRecord {
        ProgressRecord::new(
            learner(learner_id),
            item(item_id),
            level,
            fixed_now() - Duration::days(days_ago),
        )
    }

    async fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        for rec in [
            record("anna", "haus", ProficiencyLevel::Learned, 3),
            record("anna", "hund", ProficiencyLevel::Learning, 2),
            record("anna", "katze", ProficiencyLevel::Learned, 1),
            record("ben", "haus", ProficiencyLevel::Learned, 0),
        ] {
            repo.upsert_progress(&rec).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn filters_by_learner_and_items() {
        let repo = seeded().await;
        let query = ProgressQuery::for_learner(learner("anna"))
            .with_items([item("haus"), item("hund"), item("baum")])
            .with_projection(Projection::Status);

        let found = repo.fetch_progress(&query).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["haus", "hund"]);
    }

    #[tokio::test]
    async fn filters_by_level_newest_first() {
        let repo = seeded().await;
        let query = ProgressQuery::for_learner(learner("anna"))
            .with_level(ProficiencyLevel::Learned)
            .order_by_last_practiced_desc();

        let found = repo.fetch_progress(&query).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["katze", "haus"]);
    }

    #[tokio::test]
    async fn empty_item_filter_matches_nothing() {
        let repo = seeded().await;
        let query = ProgressQuery::for_learner(learner("anna")).with_items(Vec::new());
        assert!(query.matches_nothing());
        assert!(repo.fetch_progress(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_pair() {
        let repo = seeded().await;
        let updated = record("anna", "hund", ProficiencyLevel::Learned, 0).with_counts(6, 5);
        repo.upsert_progress(&updated)
            .await
            .unwrap();

        let query = ProgressQuery::for_learner(learner("anna")).with_items([item("hund")]);
        let found = repo.fetch_progress(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].level, ProficiencyLevel::Learned);
        assert_eq!(found[0].times_practiced, 6);
    }

    #[test]
    fn remote_error_display_includes_status_and_code() {
        let err = RemoteError {
            status: Some(401),
            message: "JWT expired".into(),
            code: Some("PGRST301".into()),
            ..RemoteError::default()
        };
        assert_eq!(err.to_string(), "[401] JWT expired (code PGRST301)");
    }
}
