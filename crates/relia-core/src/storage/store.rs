use super::row::{self, RawRow};
use super::schema::{COLUMNS, DDL, LEGACY_SCORE_COLUMN, TABLE};
use super::{RecordStore, StoreInspection};
use crate::errors::StoreError;
use crate::model::EvaluationRecord;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    location: Option<PathBuf>,
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const ABANDONED: u8 = 3;

/// Marks a store call as abandoned when its future is dropped early, so a
/// queued statement never runs and a running one is interrupted.
struct AbandonOnDrop {
    state: Arc<AtomicU8>,
    interrupt: Arc<InterruptHandle>,
    armed: bool,
}

impl AbandonOnDrop {
    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if !self.armed || self.transition(QUEUED, ABANDONED) {
            return;
        }
        if self.transition(RUNNING, ABANDONED) {
            tracing::warn!(event = "store_call_interrupted");
            self.interrupt.interrupt();
        }
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::unavailable(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, location: Option<PathBuf>) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            location,
        }
    }

    /// Bounds how long a statement waits on a lock held by another process.
    pub fn set_busy_timeout(&self, limit: std::time::Duration) -> Result<(), StoreError> {
        lock(&self.conn)?.busy_timeout(limit)?;
        Ok(())
    }

    /// Creates the table and adds any header column an older layout lacks.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(DDL)?;

        let present = table_columns(&conn)?;
        for column in COLUMNS.iter().filter(|c| !present.iter().any(|p| p == *c)) {
            tracing::info!(event = "schema_migrated", column = column, "adding missing column");
            conn.execute(&format!("ALTER TABLE {} ADD COLUMN {} TEXT", TABLE, column), [])?;
        }

        if let Err(e) = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_evaluations_date ON evaluations(date)",
            [],
        ) {
            // Lookups still work without it, only slower.
            tracing::warn!(event = "index_create_failed", error = %e);
        }
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let state = Arc::new(AtomicU8::new(QUEUED));
        let mut watch = AbandonOnDrop {
            state: state.clone(),
            interrupt: self.interrupt.clone(),
            armed: true,
        };
        let worker = tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            if state
                .compare_exchange(QUEUED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(StoreError::unavailable("store call abandoned before it ran"));
            }
            let out = f(&guard);
            let _ = state.compare_exchange(RUNNING, FINISHED, Ordering::SeqCst, Ordering::SeqCst);
            out
        });
        let joined = worker.await;
        watch.armed = false;
        joined.map_err(|e| StoreError::unavailable(format!("store worker failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::unavailable("connection lock poisoned"))
}

fn table_columns(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", TABLE))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = Vec::new();
    for n in names {
        out.push(n?);
    }
    Ok(out)
}

fn cell_text(v: ValueRef<'_>) -> String {
    match v {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn read_rows(conn: &Connection) -> Result<Vec<RawRow>, StoreError> {
    let present = table_columns(conn)?;
    let selected: Vec<&str> = COLUMNS
        .iter()
        .copied()
        .chain(std::iter::once(LEGACY_SCORE_COLUMN))
        .filter(|c| present.iter().any(|p| p == c))
        .collect();
    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!("SELECT {} FROM {} ORDER BY rowid", selected.join(", "), TABLE);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let mut raw = RawRow::new();
        for (i, column) in selected.iter().enumerate() {
            raw.set(column, cell_text(r.get_ref(i)?));
        }
        out.push(raw);
    }
    Ok(out)
}

fn insert_row(conn: &Connection, raw: &RawRow) -> Result<(), StoreError> {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE,
        COLUMNS.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(raw.ordered()))?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn read_all(&self) -> Result<Vec<EvaluationRecord>, StoreError> {
        let rows = self.blocking(read_rows).await?;
        Ok(rows.iter().map(row::decode).collect())
    }

    async fn append(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        let raw = row::encode(record);
        self.blocking(move |conn| insert_row(conn, &raw)).await?;
        tracing::debug!(event = "row_inserted", make = %record.make, model = %record.model);
        Ok(())
    }

    async fn inspect(&self) -> Result<StoreInspection, StoreError> {
        self.blocking(|conn| {
            let present = table_columns(conn)?;
            let missing = COLUMNS
                .iter()
                .filter(|c| !present.iter().any(|p| p == *c))
                .map(|c| c.to_string())
                .collect();
            let row_count = if present.is_empty() {
                0
            } else {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |r| {
                    r.get::<_, i64>(0)
                })? as u64
            };
            Ok(StoreInspection {
                present_columns: present.into_iter().filter(|c| c != "id").collect(),
                missing_columns: missing,
                row_count,
            })
        })
        .await
    }

    fn describe(&self) -> String {
        match &self.location {
            Some(p) => format!("sqlite:{}", p.display()),
            None => "sqlite::memory:".to_string(),
        }
    }
}
