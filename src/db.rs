use crate::config::Config;
use crate::error::StoreError;
use crate::model::{NewStarredRepository, StarredRepository};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase, Row};
use std::collections::HashSet;
use std::path::Path;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] =
    &[("001_starred_repositories.sql", include_str!("migrations/001_starred_repositories.sql"))];

const COLUMNS: &str = "id, user_id, name, full_name, description, url, star_count, language, owner, starred_at";

/// Result of a star toggle.
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    Starred(StarredRepository),
    Unstarred,
}

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
}

impl Database {
    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens the store named by `database.url`. Remote urls go through a
    /// libsql client, anything else is a local file resolved against
    /// `data_dir`.
    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let storage = &cfg.database;

        let db = if storage.is_remote() {
            tracing::info!("[db] connecting to remote database");
            let token = storage.auth_token.clone().unwrap_or_default();
            Builder::new_remote(storage.url.clone(), token).build().await?
        } else if storage.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = data_dir.join(&storage.url);
            tracing::info!(path = ?path, "[db] opening local database");
            Builder::new_local(&path).build().await?
        };

        Self::from_database(db).await
    }

    /// Fresh in-memory store with migrations applied.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibsqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database { _db: db, conn })
    }

    fn row_to_starred(row: &Row) -> Result<StarredRepository, StoreError> {
        Ok(StarredRepository {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            full_name: row.get(3)?,
            description: row.get::<Option<String>>(4)?,
            url: row.get(5)?,
            star_count: row.get::<Option<i64>>(6)?.unwrap_or(0),
            language: row.get::<Option<String>>(7)?,
            owner: row.get(8)?,
            starred_at: row.get(9)?,
        })
    }

    pub async fn find_starred(&self, user_id: &str, url: &str) -> Result<Option<StarredRepository>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM starred_repositories WHERE user_id = ? AND url = ? LIMIT 1");
        let mut rows = self.conn.query(&query, libsql::params![user_id, url]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_starred(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn is_starred(&self, user_id: &str, url: &str) -> Result<bool, StoreError> {
        let query = "SELECT 1 FROM starred_repositories WHERE user_id = ? AND url = ? LIMIT 1";
        let mut rows = self.conn.query(query, libsql::params![user_id, url]).await?;
        Ok(rows.next().await?.is_some())
    }

    /// Inserts a new star stamped with the current time. A second insert for
    /// the same `(user_id, url)` fails with [`StoreError::Duplicate`].
    pub async fn insert_starred(
        &self,
        user_id: &str,
        input: NewStarredRepository,
    ) -> Result<StarredRepository, StoreError> {
        let query = format!(
            r#"
            INSERT INTO starred_repositories
                (user_id, name, full_name, description, url, star_count, language, owner, starred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
        "#
        );
        let starred_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let result = self
            .conn
            .query(
                &query,
                libsql::params![
                    user_id,
                    input.name,
                    input.full_name,
                    input.description,
                    input.url.clone(),
                    input.star_count,
                    input.language,
                    input.owner,
                    starred_at
                ],
            )
            .await;

        let mut rows = match result {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate {
                    user_id: user_id.to_string(),
                    url: input.url,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Err(StoreError::MissingRow("insert returned no row")),
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate {
                    user_id: user_id.to_string(),
                    url: input.url,
                });
            }
            Err(e) => return Err(e.into()),
        };

        Self::row_to_starred(&row)
    }

    pub async fn delete_starred(&self, user_id: &str, id: i64) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM starred_repositories WHERE id = ? AND user_id = ?",
                libsql::params![id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Stars `input.url` for the user, or unstars it if it is already starred.
    pub async fn toggle_star(&self, user_id: &str, input: NewStarredRepository) -> Result<Toggle, StoreError> {
        match self.find_starred(user_id, &input.url).await? {
            Some(existing) => {
                self.delete_starred(user_id, existing.id).await?;
                Ok(Toggle::Unstarred)
            }
            None => Ok(Toggle::Starred(self.insert_starred(user_id, input).await?)),
        }
    }

    /// Returns the subset of `urls` the user has starred.
    pub async fn starred_urls(&self, user_id: &str, urls: &[String]) -> Result<HashSet<String>, StoreError> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; urls.len()].join(", ");
        let query = format!("SELECT url FROM starred_repositories WHERE user_id = ? AND url IN ({placeholders})");

        let mut values: Vec<libsql::Value> = Vec::with_capacity(urls.len() + 1);
        values.push(libsql::Value::from(user_id.to_string()));
        values.extend(urls.iter().map(|u| libsql::Value::from(u.clone())));

        let mut rows = self.conn.query(&query, libsql::params::Params::Positional(values)).await?;
        let mut starred = HashSet::new();
        while let Some(row) = rows.next().await? {
            starred.insert(row.get::<String>(0)?);
        }

        Ok(starred)
    }

    /// Most recently starred first.
    pub async fn list_starred(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StarredRepository>, StoreError> {
        let query = format!(
            r#"
            SELECT {COLUMNS}
            FROM starred_repositories
            WHERE user_id = ?
            ORDER BY starred_at DESC, id DESC
            LIMIT ? OFFSET ?
        "#
        );

        let mut rows = self
            .conn
            .query(&query, libsql::params![user_id, limit as i64, offset as i64])
            .await?;

        let mut repositories = vec![];
        while let Some(row) = rows.next().await? {
            repositories.push(Self::row_to_starred(&row)?);
        }

        Ok(repositories)
    }

    pub async fn count_starred(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM starred_repositories WHERE user_id = ?",
                libsql::params![user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?.max(0) as u64),
            None => Ok(0),
        }
    }
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}
