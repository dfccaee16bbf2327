//! Write-back to the persistence boundary
//!
//! Patches are merged field by field; fields a patch does not carry are left
//! untouched, so concurrent writers of unrelated fields never lose data.

use crate::types::{FieldPatch, RecordId};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::Utc;
use lead_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait PatchSink: Send + Sync {
    /// Apply all patches or none
    async fn apply(&self, patches: &[FieldPatch]) -> Result<()>;
}

/// JSON merge patch (RFC 7396) of `patch` into `target`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Patches stored in the `record_patches` table, merged with `json_patch`
pub struct SqlitePatchSink {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqlitePatchSink {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Current merged fields for a record
    pub async fn fields(&self, record_id: &str) -> Result<Option<Value>> {
        let fields: Option<String> = sqlx::query_scalar("SELECT fields FROM record_patches WHERE record_id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        fields
            .map(|f| serde_json::from_str(&f).map_err(Error::from))
            .transpose()
    }
}

#[async_trait]
impl PatchSink for SqlitePatchSink {
    async fn apply(&self, patches: &[FieldPatch]) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }

        let rows: Vec<(String, String)> = patches
            .iter()
            .map(|p| -> Result<(String, String)> {
                Ok((p.record_id.clone(), serde_json::to_string(&p.fields_json())?))
            })
            .collect::<Result<_>>()?;
        let updated_at = Utc::now().to_rfc3339();

        retry_on_lock("patch write-back", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            for (record_id, fields) in &rows {
                sqlx::query(
                    r#"
                    INSERT INTO record_patches (record_id, fields, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(record_id) DO UPDATE SET
                        fields = json_patch(record_patches.fields, excluded.fields),
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(record_id)
                .bind(fields)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            tx.commit().await.map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        tracing::debug!(patches = rows.len(), "Patches written");
        Ok(())
    }
}

/// In-process sink, used by tests and dry runs
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<BTreeMap<RecordId, Value>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fields(&self, record_id: &str) -> Option<Value> {
        self.lock().get(record_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<RecordId, Value>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PatchSink for MemorySink {
    async fn apply(&self, patches: &[FieldPatch]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal("sink unavailable".to_string()));
        }
        let mut records = self.lock();
        for patch in patches {
            let entry = records
                .entry(patch.record_id.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            merge_patch(entry, &patch.fields_json());
        }
        Ok(())
    }
}
