//! Input records
//!
//! The host platform exports person records as JSON lines, one object per line.

use crate::error::{EnrichError, Result};
use crate::types::PersonRecord;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Which records a batch covers
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub workspace: Option<String>,
    /// Empty means every record
    pub record_ids: BTreeSet<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn matches(&self, record: &PersonRecord) -> bool {
        let workspace_ok = match &self.workspace {
            Some(ws) => record.workspace_id.as_deref() == Some(ws.as_str()),
            None => true,
        };
        workspace_ok && (self.record_ids.is_empty() || self.record_ids.contains(&record.id))
    }

    /// Keep matching records in input order, up to `limit`
    pub fn apply(&self, records: Vec<PersonRecord>) -> Vec<PersonRecord> {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and filter all records
    ///
    /// Blank lines are skipped. A malformed line or duplicate id fails the read
    /// with its line number.
    pub async fn load(&self, filter: &RecordFilter) -> Result<Vec<PersonRecord>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EnrichError::Source(format!("{}: {}", self.path.display(), e)))?;

        let mut records = Vec::new();
        let mut seen = BTreeSet::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: PersonRecord = serde_json::from_str(line)
                .map_err(|e| EnrichError::Source(format!("{}:{}: {}", self.path.display(), idx + 1, e)))?;
            if !seen.insert(record.id.clone()) {
                return Err(EnrichError::Source(format!(
                    "{}:{}: duplicate record id {}",
                    self.path.display(),
                    idx + 1,
                    record.id
                )));
            }
            records.push(record);
        }

        let total = records.len();
        let records = filter.apply(records);
        tracing::info!(
            path = %self.path.display(),
            total,
            selected = records.len(),
            "Records loaded"
        );
        Ok(records)
    }
}
