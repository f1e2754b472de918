//! PostgreSQL store — one JSONB document per graph key.
//!
//! The version column makes `save` a single compare-and-swap statement, so
//! concurrent writers on different hosts cannot lose each other's nodes.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use super::{GraphStore, Snapshot, StoreError};
use crate::config::DatabaseConfig;
use crate::models::KnowledgeGraph;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_graphs (
    graph_key   TEXT PRIMARY KEY,
    version     BIGINT NOT NULL,
    document    JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

#[derive(Debug, Clone)]
pub struct PgGraphStore {
    pool: PgPool,
    graph_key: String,
}

impl PgGraphStore {
    pub fn new(pool: PgPool, graph_key: impl Into<String>) -> Self {
        Self {
            pool,
            graph_key: graph_key.into(),
        }
    }

    /// Connects, creates the table if needed and returns the store.
    pub async fn connect(config: &DatabaseConfig, graph_key: &str) -> Result<Self, StoreError> {
        let pool = crate::db::create_pool(config).await?;
        let store = Self::new(pool, graph_key);
        store.ensure_schema().await?;
        tracing::info!(graph_key, "PostgreSQL graph store connected");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_version(&self) -> Result<u64, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM knowledge_graphs WHERE graph_key = $1")
                .bind(&self.graph_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(0) as u64)
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(
            "SELECT version, document FROM knowledge_graphs WHERE graph_key = $1",
        )
        .bind(&self.graph_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((version, document)) = row else {
            return Ok(Snapshot::empty());
        };
        let version = version as u64;

        match serde_json::from_value::<KnowledgeGraph>(document) {
            Ok(graph) => Ok(Snapshot { graph, version }),
            Err(e) => {
                // Keep the stored version so the next write can replace the bad document.
                tracing::warn!(
                    graph_key = %self.graph_key,
                    version,
                    error = %e,
                    "Stored graph document is unreadable — treating as empty"
                );
                Ok(Snapshot {
                    graph: KnowledgeGraph::default(),
                    version,
                })
            }
        }
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<u64, StoreError> {
        let written: Option<i64> = if expected_version == 0 {
            sqlx::query_scalar(
                r#"
                INSERT INTO knowledge_graphs (graph_key, version, document)
                VALUES ($1, 1, $2)
                ON CONFLICT (graph_key) DO NOTHING
                RETURNING version
                "#,
            )
            .bind(&self.graph_key)
            .bind(Json(graph))
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                r#"
                UPDATE knowledge_graphs
                SET document = $2, version = version + 1, updated_at = now()
                WHERE graph_key = $1 AND version = $3
                RETURNING version
                "#,
            )
            .bind(&self.graph_key)
            .bind(Json(graph))
            .bind(expected_version as i64)
            .fetch_optional(&self.pool)
            .await?
        };

        match written {
            Some(version) => Ok(version as u64),
            None => Err(StoreError::Conflict {
                expected: expected_version,
                found: self.current_version().await?,
            }),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!(graph_key = %self.graph_key, "PostgreSQL graph store closed");
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// TESTS — require a local PostgreSQL; skipped when unreachable
// ============================================================================
