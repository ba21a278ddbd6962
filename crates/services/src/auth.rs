use async_trait::async_trait;
use learn_core::model::{Learner, LearnerId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use storage::rest::RestConfig;

use crate::error::AuthError;

/// Source of the currently signed-in learner.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the signed-in learner, or `None` for an anonymous session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` when the identity cannot be resolved right now.
    async fn current_learner(&self) -> Result<Option<Learner>, AuthError>;
}

/// Resolve the current learner, treating auth failures as anonymous.
pub async fn resolve_learner(auth: &dyn AuthProvider) -> Option<Learner> {
    match auth.current_learner().await {
        Ok(learner) => learner,
        Err(err) => {
            tracing::debug!(error = %err, "learner lookup failed; continuing anonymously");
            None
        }
    }
}

/// Fixed identity, for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    learner: Option<Learner>,
}

impl StaticAuth {
    #[must_use]
    pub fn anonymous() -> Self {
        Self { learner: None }
    }

    #[must_use]
    pub fn signed_in(learner: Learner) -> Self {
        Self {
            learner: Some(learner),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_learner(&self) -> Result<Option<Learner>, AuthError> {
        Ok(self.learner.clone())
    }
}

/// Resolves the learner from the hosted backend's `/auth/v1/user` endpoint
/// using the session access token.
#[derive(Clone)]
pub struct HostedAuth {
    client: Client,
    config: RestConfig,
}

impl HostedAuth {
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

fn learner_from_user(user: AuthUser) -> Result<Learner, AuthError> {
    let id = LearnerId::new(user.id).map_err(|e| AuthError::Malformed(e.to_string()))?;
    let learner = Learner::new(id);
    Ok(match user.email {
        Some(email) => learner.with_email(email),
        None => learner,
    })
}

#[async_trait]
impl AuthProvider for HostedAuth {
    async fn current_learner(&self) -> Result<Option<Learner>, AuthError> {
        let Some(token) = self.config.access_token.as_deref() else {
            return Ok(None);
        };

        let url = format!(
            "{}/auth/v1/user",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            // Expired or revoked session.
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => return Err(AuthError::HttpStatus(status)),
            _ => {}
        }

        let user: AuthUser = response.json().await?;
        learner_from_user(user).map(Some)
    }
}
