use crate::errors::StoreError;
use crate::model::EvaluationRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod memory;
pub mod row;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use store::SqliteStore;

/// Append-only table of evaluation records.
///
/// Implementations must tolerate rows that lack optional columns; `read_all`
/// never fails because of a single bad row.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<EvaluationRecord>, StoreError>;

    async fn append(&self, record: &EvaluationRecord) -> Result<(), StoreError>;

    /// Column-level view for diagnostics.
    async fn inspect(&self) -> Result<StoreInspection, StoreError> {
        let rows = self.read_all().await?;
        Ok(StoreInspection {
            present_columns: schema::COLUMNS.iter().map(|c| c.to_string()).collect(),
            missing_columns: Vec::new(),
            row_count: rows.len() as u64,
        })
    }

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInspection {
    pub present_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub row_count: u64,
}

pub async fn read_all_within(
    store: &dyn RecordStore,
    limit: Duration,
) -> Result<Vec<EvaluationRecord>, StoreError> {
    tokio::time::timeout(limit, store.read_all())
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

pub async fn append_within(
    store: &dyn RecordStore,
    record: &EvaluationRecord,
    limit: Duration,
) -> Result<(), StoreError> {
    tokio::time::timeout(limit, store.append(record))
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
