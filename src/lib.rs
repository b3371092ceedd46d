use std::any::Any;
use std::error::Error;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::handler::AppState;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod handler;
pub mod model;

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

/// Exact matches from `origins`, plus any https origin whose host ends with
/// one of `suffixes`.
pub fn origin_allowed(origin: &str, origins: &[String], suffixes: &[String]) -> bool {
    if origins.iter().any(|o| o == origin) {
        return true;
    }
    origin.strip_prefix("https://").is_some_and(|host| {
        suffixes
            .iter()
            .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    })
}

pub fn cors_layer(cfg: &config::Cors) -> CorsLayer {
    let origins = cfg.origins.clone();
    let suffixes = cfg.origin_suffixes.clone();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .map(|o| origin_allowed(o, &origins, &suffixes))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::Internal(details).into_response()
}

/// Full application router. `/` and `/api/health` are public, everything
/// else goes through [`auth::require_auth`].
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route("/search", post(handler::search))
        .route("/repositories", get(handler::list_starred))
        .route("/repositories/star", post(handler::toggle_star))
        .route("/repositories/check/*url", get(handler::check_starred))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    let api = Router::new()
        .route("/health", get(handler::healthcheck))
        .merge(protected);

    Router::new()
        .route("/", get(handler::index))
        .nest("/api", api)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
