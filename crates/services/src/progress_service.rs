use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use learn_core::model::{
    CefrLevel, ItemId, LearnerId, MasteryMap, ProficiencyLevel, ProgressRecord, TopicProgress,
};
use storage::repository::{Projection, ProgressQuery, ProgressRepository, StorageError};

use crate::auth::{AuthProvider, resolve_learner};
use crate::error::ProgressError;

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Read-only mastery queries for an explicitly supplied learner.
///
/// Each fail-soft method has a `try_*` twin that reports why nothing was
/// returned. The fail-soft methods log storage failures and hand back empty
/// results so progress displays degrade to "nothing known".
#[derive(Clone)]
pub struct ProgressStore {
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>) -> Self {
        Self { progress }
    }

    /// Mastery flags for the requested items.
    ///
    /// Duplicate ids collapse to one entry. Items without a stored record are
    /// absent from the map.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Anonymous` without a learner and
    /// `ProgressError::Storage` when the query fails.
    pub async fn try_mastery_status(
        &self,
        learner: Option<&LearnerId>,
        item_ids: &[ItemId],
    ) -> Result<MasteryMap, ProgressError> {
        let learner = learner.ok_or(ProgressError::Anonymous)?;
        let requested: BTreeSet<ItemId> = item_ids.iter().cloned().collect();
        if requested.is_empty() {
            return Ok(MasteryMap::new());
        }

        let query = ProgressQuery::for_learner(learner.clone())
            .with_items(requested.iter().cloned())
            .with_projection(Projection::Status);
        let records = self.progress.fetch_progress(&query).await?;

        Ok(records
            .into_iter()
            .filter(|record| &record.learner_id == learner && requested.contains(&record.item_id))
            .map(|record| {
                let mastered = record.is_mastered();
                (record.item_id, mastered)
            })
            .collect())
    }

    /// See [`ProgressStore::try_mastery_status`]; empty on any failure.
    pub async fn mastery_status(
        &self,
        learner: Option<&LearnerId>,
        item_ids: &[ItemId],
    ) -> MasteryMap {
        self.try_mastery_status(learner, item_ids)
            .await
            .unwrap_or_else(|err| fail_soft("mastery_status", learner, &err))
    }

    /// Every mastered record for the learner, most recently practiced first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Anonymous` without a learner and
    /// `ProgressError::Storage` when the query fails.
    pub async fn try_mastered_items(
        &self,
        learner: Option<&LearnerId>,
    ) -> Result<Vec<ProgressRecord>, ProgressError> {
        let learner = learner.ok_or(ProgressError::Anonymous)?;
        let query = ProgressQuery::for_learner(learner.clone())
            .with_level(ProficiencyLevel::Learned)
            .with_projection(Projection::Full)
            .order_by_last_practiced_desc();

        let mut records: Vec<ProgressRecord> = self
            .progress
            .fetch_progress(&query)
            .await?
            .into_iter()
            .filter(|record| &record.learner_id == learner && record.is_mastered())
            .collect();
        // Stable, so ties keep the backend's order.
        records.sort_by(|a, b| b.last_practiced_at.cmp(&a.last_practiced_at));
        Ok(records)
    }

    /// See [`ProgressStore::try_mastered_items`]; empty on any failure.
    pub async fn mastered_items(&self, learner: Option<&LearnerId>) -> Vec<ProgressRecord> {
        self.try_mastered_items(learner)
            .await
            .unwrap_or_else(|err| fail_soft("mastered_items", learner, &err))
    }

    /// Total number of items the learner has mastered.
    pub async fn mastered_count(&self, learner: Option<&LearnerId>) -> usize {
        self.mastered_items(learner).await.len()
    }

    /// Mastered vs. distinct requested items, derived from
    /// [`ProgressStore::mastery_status`].
    pub async fn topic_progress(
        &self,
        learner: Option<&LearnerId>,
        item_ids: &[ItemId],
    ) -> TopicProgress {
        let status = self.mastery_status(learner, item_ids).await;
        topic_from_status(&status, item_ids)
    }

    /// Topic progress for several CEFR levels from a single mastery lookup
    /// over the union of their items.
    pub async fn level_progress(
        &self,
        learner: Option<&LearnerId>,
        levels: &BTreeMap<CefrLevel, Vec<ItemId>>,
    ) -> BTreeMap<CefrLevel, TopicProgress> {
        let all: Vec<ItemId> = levels.values().flatten().cloned().collect();
        let status = self.mastery_status(learner, &all).await;
        levels
            .iter()
            .map(|(level, ids)| (*level, topic_from_status(&status, ids)))
            .collect()
    }
}

fn topic_from_status(status: &MasteryMap, item_ids: &[ItemId]) -> TopicProgress {
    let distinct: BTreeSet<&ItemId> = item_ids.iter().collect();
    let mastered = distinct.iter().filter(|id| status.is_mastered(id)).count();
    TopicProgress::new(mastered, distinct.len())
}

fn fail_soft<T: Default>(
    operation: &'static str,
    learner: Option<&LearnerId>,
    err: &ProgressError,
) -> T {
    match err {
        ProgressError::Anonymous => {
            tracing::debug!(operation, "no learner signed in; returning empty progress");
        }
        ProgressError::Storage(StorageError::Remote(remote)) => {
            tracing::warn!(
                operation,
                learner = ?learner,
                status = ?remote.status,
                error_message = %remote.message,
                details = ?remote.details,
                hint = ?remote.hint,
                code = ?remote.code,
                "progress query rejected by backend"
            );
        }
        ProgressError::Storage(storage) => {
            tracing::warn!(
                operation,
                learner = ?learner,
                error = %storage,
                "progress query failed"
            );
        }
    }
    T::default()
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// `ProgressStore` bound to an auth provider; resolves the learner on every call.
#[derive(Clone)]
pub struct ProgressService {
    auth: Arc<dyn AuthProvider>,
    store: ProgressStore,
}

impl ProgressService {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            auth,
            store: ProgressStore::new(progress),
        }
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    async fn learner_id(&self) -> Option<LearnerId> {
        resolve_learner(self.auth.as_ref())
            .await
            .map(|learner| learner.id)
    }

    pub async fn mastery_status(&self, item_ids: &[ItemId]) -> MasteryMap {
        let learner = self.learner_id().await;
        self.store.mastery_status(learner.as_ref(), item_ids).await
    }

    pub async fn mastered_items(&self) -> Vec<ProgressRecord> {
        let learner = self.learner_id().await;
        self.store.mastered_items(learner.as_ref()).await
    }

    pub async fn mastered_count(&self) -> usize {
        let learner = self.learner_id().await;
        self.store.mastered_count(learner.as_ref()).await
    }

    pub async fn topic_progress(&self, item_ids: &[ItemId]) -> TopicProgress {
        let learner = self.learner_id().await;
        self.store.topic_progress(learner.as_ref(), item_ids).await
    }

    pub async fn level_progress(
        &self,
        levels: &BTreeMap<CefrLevel, Vec<ItemId>>,
    ) -> BTreeMap<CefrLevel, TopicProgress> {
        let learner = self.learner_id().await;
        self.store.level_progress(learner.as_ref(), levels).await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
