//! Chat history persistence
//!
//! Append-only log of user questions and produced answers. Backed by Postgres
//! when a database URL is configured, otherwise kept in memory for the life of
//! the process. Sessions never read history back.

use crate::error::OrchestrationError;
use crate::models::{ChatRecord, ChatRole};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, role: ChatRole, content: &str) -> Result<ChatRecord>;

    /// All records, newest first
    async fn list(&self) -> Result<Vec<ChatRecord>>;
}

//
// ================= In-memory =================
//

#[derive(Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<ChatRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, role: ChatRole, content: &str) -> Result<ChatRecord> {
        let mut records = self.records.write().await;
        let record = ChatRecord {
            id: records.len() as i64 + 1,
            timestamp: Utc::now(),
            role,
            content: content.to_string(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<ChatRecord>> {
        let records = self.records.read().await;
        let mut items = records.clone();
        // ids break ties between records written in the same instant
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(items)
    }
}

//
// ================= Postgres =================
//

#[derive(Debug)]
pub struct PostgresHistory {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresHistory {
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Invalid history database URL: {}", e))
            })?;

        Ok(Self {
            pool,
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_history (
                      id BIGSERIAL PRIMARY KEY,
                      timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      role TEXT NOT NULL,
                      content TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize chat history schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<ChatRecord> {
        let decode = |e: sqlx::Error| {
            OrchestrationError::DatabaseError(format!("Malformed chat history row: {}", e))
        };

        let role: String = row.try_get("role").map_err(decode)?;
        let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(decode)?;

        Ok(ChatRecord {
            id: row.try_get("id").map_err(decode)?,
            timestamp,
            role: role_from_db(&role)?,
            content: row.try_get("content").map_err(decode)?,
        })
    }
}

fn role_to_db(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::System => "system",
    }
}

fn role_from_db(role: &str) -> Result<ChatRole> {
    match role.to_lowercase().as_str() {
        "user" => Ok(ChatRole::User),
        "system" => Ok(ChatRole::System),
        other => Err(OrchestrationError::DatabaseError(format!(
            "Unknown chat history role '{}'",
            other
        ))),
    }
}

#[async_trait]
impl HistoryStore for PostgresHistory {
    async fn append(&self, role: ChatRole, content: &str) -> Result<ChatRecord> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO chat_history (role, content)
            VALUES ($1, $2)
            RETURNING id, timestamp, role, content
            "#,
        )
        .bind(role_to_db(role))
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to append chat history: {}", e))
        })?;

        Self::record_from_row(&row)
    }

    async fn list(&self) -> Result<Vec<ChatRecord>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, role, content
            FROM chat_history
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to load chat history: {}", e))
        })?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

/// Pick the history backend: Postgres when a URL is given and parses,
/// in-memory otherwise.
pub fn build_history_store(database_url: Option<&str>) -> Arc<dyn HistoryStore> {
    if let Some(url) = database_url {
        match PostgresHistory::connect_lazy(url) {
            Ok(store) => {
                info!("Chat history backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres history backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Chat history backend: in-memory");
    Arc::new(InMemoryHistory::new())
}
