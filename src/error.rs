use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(true);

const GENERIC_DETAILS: &str = "Something went wrong";

/// Controls whether error bodies carry the underlying message. Written once
/// at startup; production turns it off.
pub fn expose_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

fn details_enabled() -> bool {
    EXPOSE_DETAILS.load(Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("repository {url} is already starred by {user_id}")]
    Duplicate { user_id: String, url: String },

    #[error("store query failed: {0}")]
    Libsql(#[from] libsql::Error),

    #[error("store returned no data: {0}")]
    MissingRow(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("token rejected by identity provider: {0}")]
    Rejected(String),

    #[error("identity provider unreachable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("GitHub API rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("search failed: {0}")]
    Upstream(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> AppError {
        move |source| AppError::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            BadRequest(_) => StatusCode::BAD_REQUEST,
            Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RateLimited => StatusCode::FORBIDDEN,
            Upstream(_) | Store { .. } | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for this error. `expose` decides whether the underlying
    /// message is included or replaced with generic text.
    pub fn body(&self, expose: bool) -> Value {
        use AppError::*;
        let details = |msg: String| if expose { msg } else { GENERIC_DETAILS.to_string() };

        match self {
            BadRequest(msg) => json!({ "error": msg }),
            Unauthorized(e) => json!({ "error": "Authentication required", "details": details(e.to_string()) }),
            RateLimited => json!({ "error": self.to_string() }),
            Upstream(msg) => json!({ "error": "Failed to search repositories", "details": details(msg.clone()) }),
            Store { context, source } => json!({ "error": context, "details": details(source.to_string()) }),
            Internal(msg) => json!({ "error": "Internal server error", "details": details(msg.clone()) }),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::RateLimited => AppError::RateLimited,
            SearchError::Failed(msg) => AppError::Upstream(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %crate::unpack_error(&self), status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        (status, Json(self.body(details_enabled()))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
