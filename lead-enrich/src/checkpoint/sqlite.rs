//! SQLite checkpoint store
//!
//! One row per batch holding the JSON snapshot. Saves are a single upsert,
//! retried on lock contention.

use super::{CheckpointState, CheckpointStore};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use lead_common::{Error, Result};
use sqlx::{Row, SqlitePool};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, batch_id: &str) -> Result<Option<CheckpointState>> {
        let row = sqlx::query("SELECT state FROM batch_checkpoints WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let state: String = row.get("state");
                let state: CheckpointState = serde_json::from_str(&state)
                    .map_err(|e| Error::Internal(format!("Failed to deserialize checkpoint: {}", e)))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &CheckpointState) -> Result<()> {
        // Prepare everything before touching the database
        let snapshot = serde_json::to_string(state)?;
        let batch_id = state.batch_id.clone();
        let kind = state.kind.as_str();
        let processed = state.processed_record_ids.len() as i64;
        let started_at = state.started_at.to_rfc3339();
        let last_saved_at = state.last_saved_at.to_rfc3339();

        retry_on_lock("checkpoint save", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO batch_checkpoints (
                    batch_id, kind, state, processed_count, started_at, last_saved_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(batch_id) DO UPDATE SET
                    state = excluded.state,
                    processed_count = excluded.processed_count,
                    last_saved_at = excluded.last_saved_at
                "#,
            )
            .bind(&batch_id)
            .bind(kind)
            .bind(&snapshot)
            .bind(processed)
            .bind(&started_at)
            .bind(&last_saved_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::types::{BatchKind, FieldPatch};

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteCheckpointStore::new(pool.clone(), 1000);

        assert!(store.load("b-1").await.unwrap().is_none());

        let mut state = CheckpointState::new("b-1", BatchKind::Contacts);
        state.processed_record_ids.insert("p-1".into());
        state.pending_patches.push(FieldPatch::new("p-1"));
        store.save(&state).await.unwrap();

        state.processed_record_ids.insert("p-2".into());
        store.save(&state).await.unwrap();

        let loaded = store.load("b-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        let count: i64 = sqlx::query_scalar("SELECT processed_count FROM batch_checkpoints WHERE batch_id = 'b-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
