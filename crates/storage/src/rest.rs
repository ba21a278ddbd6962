//! Adapter for a hosted PostgREST-style backend.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use learn_core::model::{ItemId, LearnerId, ProficiencyLevel, ProgressRecord};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::repository::{
    Projection, ProgressQuery, ProgressRepository, ProgressWriter, RemoteError, Storage,
    StorageError,
};

const DEFAULT_TABLE: &str = "word_progress";
const STATUS_COLUMNS: &str = "user_id,word_id,proficiency_level";
const FULL_COLUMNS: &str =
    "user_id,word_id,proficiency_level,times_practiced,correct_count,last_practiced";

#[derive(Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    /// Session token of the signed-in learner; the anon key is used when absent.
    pub access_token: Option<String>,
}

impl RestConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.into(),
            access_token: None,
        }
    }

    /// Read `LEARN_REST_URL`, `LEARN_REST_KEY`, `LEARN_REST_TABLE` and
    /// `LEARN_REST_TOKEN` through `lookup`. Blank values count as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new(var("LEARN_REST_URL")?, var("LEARN_REST_KEY")?);
        if let Some(table) = var("LEARN_REST_TABLE") {
            config.table = table;
        }
        if let Some(token) = var("LEARN_REST_TOKEN") {
            config = config.with_access_token(token);
        }
        Some(config)
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct RestRepository {
    client: Client,
    config: RestConfig,
}

impl RestRepository {
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted REST backend.
    #[must_use]
    pub fn rest(config: RestConfig) -> Self {
        let repo = RestRepository::new(config);
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let writer: Arc<dyn ProgressWriter> = Arc::new(repo);
        Self { progress, writer }
    }
}

/// Quote a value for a PostgREST `in.(...)` list.
fn quote_list_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Query-string parameters for a `ProgressQuery`.
pub(crate) fn query_params(query: &ProgressQuery) -> Vec<(&'static str, String)> {
    let select = match query.projection() {
        Projection::Status => STATUS_COLUMNS,
        Projection::Full => FULL_COLUMNS,
    };
    let mut params = vec![
        ("select", select.to_owned()),
        ("user_id", format!("eq.{}", query.learner_id())),
    ];

    if let Some(ids) = query.item_ids() {
        let list: Vec<String> = ids.iter().map(|id| quote_list_value(id.as_str())).collect();
        params.push(("word_id", format!("in.({})", list.join(","))));
    }
    if let Some(level) = query.level() {
        params.push(("proficiency_level", format!("eq.{}", level.as_str())));
    }
    if query.newest_first() {
        params.push(("order", "last_practiced.desc,word_id.asc".to_owned()));
    } else {
        params.push(("order", "word_id.asc".to_owned()));
    }
    params
}

/// Row as returned by the backend; unselected columns are absent.
#[derive(Debug, Deserialize)]
struct RestRow {
    user_id: LearnerId,
    word_id: ItemId,
    proficiency_level: ProficiencyLevel,
    #[serde(default)]
    times_practiced: Option<u32>,
    #[serde(default)]
    correct_count: Option<u32>,
    #[serde(default)]
    last_practiced: Option<DateTime<Utc>>,
}

impl From<RestRow> for ProgressRecord {
    fn from(row: RestRow) -> Self {
        Self {
            learner_id: row.user_id,
            item_id: row.word_id,
            level: row.proficiency_level,
            times_practiced: row.times_practiced.unwrap_or(0),
            correct_count: row.correct_count.unwrap_or(0),
            last_practiced_at: row.last_practiced.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RestUpsert<'a> {
    user_id: &'a str,
    word_id: &'a str,
    proficiency_level: &'static str,
    times_practiced: u32,
    correct_count: u32,
    last_practiced: DateTime<Utc>,
}

pub(crate) fn decode_rows(body: &str) -> Result<Vec<ProgressRecord>, StorageError> {
    let rows: Vec<RestRow> =
        serde_json::from_str(body).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(rows.into_iter().map(ProgressRecord::from).collect())
}

/// Build a `RemoteError` from a failed response body, keeping the raw body
/// as the message when it is not the provider's JSON error shape.
pub(crate) fn decode_error(status: StatusCode, body: &str) -> RemoteError {
    let mut err = serde_json::from_str::<RemoteError>(body).unwrap_or_else(|_| RemoteError {
        message: body.trim().to_owned(),
        ..RemoteError::default()
    });
    if err.message.is_empty() {
        err.message = status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned();
    }
    err.status = Some(status.as_u16());
    err
}

async fn read_body(response: reqwest::Response) -> Result<String, StorageError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    if !status.is_success() {
        return Err(StorageError::Remote(decode_error(status, &body)));
    }
    Ok(body)
}

#[async_trait::async_trait]
impl ProgressRepository for RestRepository {
    async fn fetch_progress(
        &self,
        query: &ProgressQuery,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        // PostgREST rejects `in.()`.
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        let request = self
            .client
            .get(self.config.table_url())
            .query(&query_params(query));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let body = read_body(response).await?;
        decode_rows(&body)
    }
}

#[async_trait::async_trait]
impl ProgressWriter for RestRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let payload = [RestUpsert {
            user_id: record.learner_id.as_str(),
            word_id: record.item_id.as_str(),
            proficiency_level: record.level.as_str(),
            times_practiced: record.times_practiced,
            correct_count: record.correct_count,
            last_practiced: record.last_practiced_at,
        }];

        let request = self
            .client
            .post(self.config.table_url())
            .query(&[("on_conflict", "user_id,word_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&payload);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        read_body(response).await?;
        Ok(())
    }
}
