//! Bearer-token gate in front of every protected route.
//!
//! Tokens are verified by an external identity provider; this service only
//! forwards them and trusts the user id that comes back.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Identity;
use crate::error::{AppError, AuthError};
use crate::handler::AppState;

/// Identity of the caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the stable user id the token was issued to.
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(alias = "sub")]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct VerifyError {
    #[serde(alias = "message")]
    error: Option<String>,
}

pub struct RemoteIdentityProvider {
    client: Client,
    verify_url: String,
    secret_key: String,
}

impl RemoteIdentityProvider {
    pub fn new(cfg: &Identity) -> Self {
        Self {
            client: Client::new(),
            verify_url: cfg.verify_url.clone(),
            secret_key: cfg.secret_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .bearer_auth(&self.secret_key)
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<VerifyError>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("identity provider responded with {status}"));
            return Err(AuthError::Rejected(reason));
        }

        let body = response
            .json::<VerifyResponse>()
            .await
            .map_err(|e| AuthError::Rejected(format!("unexpected verification response: {e}")))?;

        if body.user_id.is_empty() {
            return Err(AuthError::Rejected("verification returned no user id".to_string()));
        }
        Ok(body.user_id)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;
    let user_id = state.identity.verify(token).await?;

    tracing::debug!(user_id = %user_id, "request authenticated");
    req.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(req).await)
}
