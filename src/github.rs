//! Client for the GitHub repository search endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;

use crate::config::Github;
use crate::error::SearchError;
use crate::model::RepositorySummary;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keyword: String,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<RepositorySummary>,
}

#[async_trait]
pub trait RepositorySearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError>;
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: Option<String>,
}

pub struct GithubSearch {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubSearch {
    pub fn new(cfg: &Github) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .user_agent(cfg.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }
}

fn is_rate_limited(status: StatusCode, remaining: Option<&str>, message: Option<&str>) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (remaining == Some("0") || message.is_some_and(|m| m.to_lowercase().contains("rate limit")))
}

#[async_trait]
impl RepositorySearch for GithubSearch {
    /// Single request, most-starred first. Never retried.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError> {
        let url = format!("{}/search/repositories", self.api_url);
        let page = query.page.to_string();
        let per_page = query.per_page.to_string();

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .query(&[
                ("q", query.keyword.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Failed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SearchPage>()
                .await
                .map_err(|e| SearchError::Failed(format!("invalid search response: {e}")));
        }

        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let message = response
            .json::<UpstreamError>()
            .await
            .ok()
            .and_then(|body| body.message);

        if is_rate_limited(status, remaining.as_deref(), message.as_deref()) {
            tracing::warn!(status = status.as_u16(), "github rate limit hit");
            return Err(SearchError::RateLimited);
        }

        Err(SearchError::Failed(
            message.unwrap_or_else(|| format!("github responded with {status}")),
        ))
    }
}
