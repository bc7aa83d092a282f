use super::RecordStore;
use crate::errors::StoreError;
use crate::model::EvaluationRecord;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-process store with failure and latency injection.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<EvaluationRecord>>,
    fail_reads: AtomicBool,
    fail_appends: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    append_ack_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    appends: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<EvaluationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.read_delay.lock() {
            *d = delay;
        }
    }

    /// Delays the acknowledgement of an append that has already been stored.
    pub fn set_append_ack_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.append_ack_delay.lock() {
            *d = delay;
        }
    }

    pub fn records(&self) -> Vec<EvaluationRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful appends only.
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read_all(&self) -> Result<Vec<EvaluationRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.read_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected read failure"));
        }
        self.records
            .lock()
            .map(|r| r.clone())
            .map_err(|_| StoreError::unavailable("records lock poisoned"))
    }

    async fn append(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected append failure"));
        }
        self.records
            .lock()
            .map_err(|_| StoreError::unavailable("records lock poisoned"))?
            .push(record.clone());
        self.appends.fetch_add(1, Ordering::SeqCst);
        let delay = self.append_ack_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
