use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

use crate::api::{
    CheckResponse, JsonBody, ListParams, ListResponse, MessageResponse, Pagination, SearchRequest, SearchResponse, StarRequest,
    StarResponse,
};
use crate::auth::{AuthUser, IdentityProvider};
use crate::db::{Database, Toggle};
use crate::error::{AppError, AppResult};
use crate::github::{RepositorySearch, SearchQuery};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub search: Arc<dyn RepositorySearch>,
    pub identity: Arc<dyn IdentityProvider>,
}

const DEFAULT_SEARCH_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 10;
const MAX_PER_PAGE: u32 = 100;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, PartialEq)]
pub struct HandlerParams {
    pub page: u32,
    pub limit: u32,
    pub offset: u32,
}

impl ListParams {
    pub fn into_handler_params(self) -> HandlerParams {
        let page = self.page.unwrap_or(DEFAULT_PAGE).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        HandlerParams {
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }
}

pub fn page_count(total: u64, limit: u32) -> u64 {
    total.div_ceil(u64::from(limit.max(1)))
}

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "GitHub Repository Search API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "search": "POST /api/search",
            "star": "POST /api/repositories/star",
            "starred": "GET /api/repositories",
            "check": "GET /api/repositories/check/:url",
        }
    }))
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(MessageResponse {
        message: "Server is running!",
    })
}

/// Searches upstream and flags the hits the caller has already starred.
/// Only the urls on the returned page are looked up.
pub async fn search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(req): JsonBody<SearchRequest>,
) -> AppResult<Json<SearchResponse>> {
    let keyword = req
        .keyword
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Keyword is required".to_string()))?;
    let page = req.page.unwrap_or(DEFAULT_SEARCH_PAGE).max(1);
    let per_page = req.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);

    let query = SearchQuery {
        keyword: keyword.clone(),
        page,
        per_page,
    };
    let result = state.search.search(&query).await?;

    let urls: Vec<String> = result.items.iter().map(|r| r.html_url.clone()).collect();
    let starred = state
        .db
        .starred_urls(&user.user_id, &urls)
        .await
        .map_err(AppError::store("Failed to search repositories"))?;

    let repositories = result
        .items
        .into_iter()
        .map(|mut repo| {
            repo.is_starred = starred.contains(&repo.html_url);
            repo
        })
        .collect();

    info!(user_id = %user.user_id, keyword = %keyword, total = result.total_count, "search completed");
    Ok(Json(SearchResponse {
        keyword,
        total_count: result.total_count,
        repositories,
        page,
        per_page,
    }))
}

pub async fn toggle_star(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(req): JsonBody<StarRequest>,
) -> AppResult<Response> {
    if req.html_url.trim().is_empty() {
        return Err(AppError::BadRequest("Repository url is required".to_string()));
    }

    let input = req.into_new_starred();
    let url = input.url.clone();
    let outcome = state
        .db
        .toggle_star(&user.user_id, input)
        .await
        .map_err(AppError::store("Failed to star/unstar repository"))?;

    let response = match outcome {
        Toggle::Starred(repository) => {
            info!(user_id = %user.user_id, url = %url, "repository starred");
            (
                StatusCode::CREATED,
                Json(StarResponse {
                    message: "Repository starred",
                    starred: true,
                    repository: Some(repository),
                }),
            )
                .into_response()
        }
        Toggle::Unstarred => {
            info!(user_id = %user.user_id, url = %url, "repository unstarred");
            (
                StatusCode::OK,
                Json(StarResponse {
                    message: "Repository unstarred",
                    starred: false,
                    repository: None,
                }),
            )
                .into_response()
        }
    };

    Ok(response)
}

pub async fn list_starred(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ListResponse>> {
    let hp = params.into_handler_params();
    let on_error = "Failed to fetch starred repositories";

    let repositories = state
        .db
        .list_starred(&user.user_id, hp.limit, hp.offset)
        .await
        .map_err(AppError::store(on_error))?;
    let total = state
        .db
        .count_starred(&user.user_id)
        .await
        .map_err(AppError::store(on_error))?;

    Ok(Json(ListResponse {
        repositories,
        pagination: Pagination {
            page: hp.page,
            limit: hp.limit,
            total,
            pages: page_count(total, hp.limit),
        },
    }))
}

/// `url` arrives percent-decoded from the path and is compared as is. The
/// wildcard route lets clients send the slashes raw or encoded.
pub async fn check_starred(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(url): Path<String>,
) -> AppResult<Json<CheckResponse>> {
    let starred = state
        .db
        .is_starred(&user.user_id, &url)
        .await
        .map_err(AppError::store("Failed to check starred status"))?;

    Ok(Json(CheckResponse { starred }))
}
