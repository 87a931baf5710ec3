// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed implementation of `runner_orchestrator_domain::ports::Persistence`.
//! Writes are fire-and-forget from the caller's perspective (errors are
//! returned, but the domain never treats a `put` failure as fatal); startup
//! restores are best-effort.

use async_trait::async_trait;
use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::ports::Persistence;
use sqlx::{Row, SqlitePool};

use super::schema::{CREATE_KV_PREFIX_INDEX, CREATE_KV_TABLE};

pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub async fn new(pool: SqlitePool) -> Result<Self, OrchestratorError> {
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    pub async fn from_file(database_path: &str) -> Result<Self, OrchestratorError> {
        let pool = SqlitePool::connect(database_path)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to connect to {database_path}: {e}")))?;
        Self::new(pool).await
    }

    pub async fn in_memory() -> Result<Self, OrchestratorError> {
        let pool = SqlitePool::connect(":memory:")
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to create in-memory database: {e}")))?;
        Self::new(pool).await
    }

    async fn ensure_schema(&self) -> Result<(), OrchestratorError> {
        sqlx::query(CREATE_KV_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to create kv table: {e}")))?;
        sqlx::query(CREATE_KV_PREFIX_INDEX)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to create kv index: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), OrchestratorError> {
        sqlx::query("INSERT INTO orchestrator_kv (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to put key {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, OrchestratorError> {
        let row = sqlx::query("SELECT value FROM orchestrator_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to get key {key}: {e}")))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, OrchestratorError> {
        let pattern = format!("{prefix}%");
        let rows = sqlx::query("SELECT key FROM orchestrator_kv WHERE key LIKE ? ORDER BY key")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to list prefix {prefix}: {e}")))?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }

    async fn delete(&self, key: &str) -> Result<(), OrchestratorError> {
        sqlx::query("DELETE FROM orchestrator_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestratorError::persistence(format!("failed to delete key {key}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = SqlitePersistence::in_memory().await.unwrap();
        store.put("/profiles/repo-a:ci", b"payload").await.unwrap();

        let value = store.get("/profiles/repo-a:ci").await.unwrap();
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let store = SqlitePersistence::in_memory().await.unwrap();
        assert_eq!(store.get("/profiles/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let store = SqlitePersistence::in_memory().await.unwrap();
        store.put("/baselines/cpu", b"v1").await.unwrap();
        store.put("/baselines/cpu", b"v2").await.unwrap();

        assert_eq!(store.get("/baselines/cpu").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn list_prefix_returns_matching_keys_only() {
        let store = SqlitePersistence::in_memory().await.unwrap();
        store.put("/profiles/a", b"1").await.unwrap();
        store.put("/profiles/b", b"2").await.unwrap();
        store.put("/baselines/cpu", b"3").await.unwrap();

        let keys = store.list_prefix("/profiles/").await.unwrap();
        assert_eq!(keys, vec!["/profiles/a".to_string(), "/profiles/b".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = SqlitePersistence::in_memory().await.unwrap();
        store.put("/history/executions/1", b"plan").await.unwrap();
        store.delete("/history/executions/1").await.unwrap();

        assert_eq!(store.get("/history/executions/1").await.unwrap(), None);
    }
}
