use serde::{Deserialize, Serialize};

/// A repository saved by one user. `(user_id, url)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarredRepository {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: i64,
    pub language: Option<String>,
    pub owner: String,
    pub starred_at: String,
}

/// Fields captured when a repository is starred. The star count is a
/// snapshot and is never refreshed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStarredRepository {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: i64,
    pub language: Option<String>,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// One search hit as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub language: Option<String>,
    pub owner: Owner,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(rename = "isStarred", default)]
    pub is_starred: bool,
}
