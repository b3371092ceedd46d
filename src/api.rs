use crate::error::AppError;
use crate::model::{NewStarredRepository, RepositorySummary, StarredRepository};
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON request body whose failures come back as a 400 in the usual error
/// shape. An empty body reads as `{}`, and the content type is not checked.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e.body_text())))?;

        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &bytes };
        serde_json::from_slice(raw)
            .map(JsonBody)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub keyword: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub keyword: String,
    pub total_count: u64,
    pub repositories: Vec<RepositorySummary>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct StarOwner {
    pub login: String,
}

/// Star request body, in the upstream's snake_case field names.
#[derive(Debug, Deserialize)]
pub struct StarRequest {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    pub owner: StarOwner,
}

impl StarRequest {
    pub fn into_new_starred(self) -> NewStarredRepository {
        NewStarredRepository {
            name: self.name,
            full_name: self.full_name,
            description: self.description,
            url: self.html_url,
            star_count: self.stargazers_count.unwrap_or(0),
            language: self.language,
            owner: self.owner.login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StarResponse {
    pub message: &'static str,
    pub starred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<StarredRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub repositories: Vec<StarredRepository>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub starred: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
