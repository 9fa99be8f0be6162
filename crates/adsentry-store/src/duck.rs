//! DuckDB storage for historical violation cases and their tag flags.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use adsentry_core::{HistoricalCase, Industry, Tag, TagRegistry};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{Connection, params};
use tracing::{debug, info};

use crate::{CaseRow, CaseStore, StoreError, TagAssignment};

const CASES_TABLE: &str = "violation_cases";

/// Metadata columns of `violation_cases`, in select order. Tag flag columns
/// follow them.
const CASE_COLUMNS: &str =
    "id, product_name, case_explanation, violation_law, case_date, source_link, industry";
const CASE_COLUMN_COUNT: usize = 7;

/// DuckDB store for the `violation_cases` table.
///
/// One row per adjudicated case with a `SMALLINT` flag column per tag in the
/// registry. Supports both in-memory (ephemeral) and persistent (file-backed)
/// modes. The connection sits behind a shared mutex; clones share it.
///
/// The synchronous methods block the calling thread. The [`CaseStore`] impl
/// runs them on the blocking pool so a caller's timeout can fire while a
/// query, or a wait for the connection, is still in progress.
#[derive(Clone)]
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
    registry: Arc<TagRegistry>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database with the case schema in place.
    pub fn open(registry: Arc<TagRegistry>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// Tag columns added to the registry since the file was created are
    /// added to the table with a default of 0.
    pub fn open_persistent(path: &Path, registry: Arc<TagRegistry>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `op` against a clone of this store on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DuckStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Other(format!("duckdb task failed: {e}")))?
    }

    /// Create `violation_cases` if missing and add any missing tag columns.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {CASES_TABLE} (
                id BIGINT PRIMARY KEY,
                product_name VARCHAR NOT NULL,
                case_explanation VARCHAR NOT NULL DEFAULT '',
                violation_law VARCHAR,
                case_date VARCHAR,
                source_link VARCHAR,
                industry VARCHAR
            );"
        );
        for column in self.registry.columns() {
            sql.push_str(&format!(
                "ALTER TABLE {CASES_TABLE} ADD COLUMN IF NOT EXISTS {column} SMALLINT DEFAULT 0;"
            ));
        }
        self.conn()?.execute_batch(&sql)?;
        debug!(tags = self.registry.len(), "case schema ready");
        Ok(())
    }

    /// Append cases from a Parquet file, matching columns by name.
    ///
    /// Tag columns absent from the file default to 0. Returns the table's
    /// row count after the load.
    pub fn load_cases_parquet(&self, path: &Path) -> Result<u64, StoreError> {
        if !path.exists() {
            return Err(StoreError::ParquetNotFound(path.to_path_buf()));
        }
        let literal = path.display().to_string().replace('\'', "''");
        let sql = format!("INSERT INTO {CASES_TABLE} BY NAME SELECT * FROM read_parquet('{literal}')");
        let inserted = self.conn()?.execute(&sql, [])?;
        let count = self.count_rows(None)?;
        info!(inserted, count, "loaded violation cases");
        Ok(count)
    }

    /// Insert a single case with its tag flags.
    pub fn insert_case(&self, case: &HistoricalCase) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO {CASES_TABLE} ({CASE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                case.id,
                case.product_name,
                case.explanation,
                case.law,
                case.date,
                case.link,
                case.industry.as_str(),
            ],
        )?;
        if !case.tags.is_empty() {
            let sets = set_clause(&case.tags);
            conn.execute(
                &format!("UPDATE {CASES_TABLE} SET {sets} WHERE id = ?"),
                params![case.id],
            )?;
        }
        Ok(())
    }

    // ── Counts ──

    fn count_rows(&self, predicate: Option<&str>) -> Result<u64, StoreError> {
        let sql = match predicate {
            Some(p) => format!("SELECT count(*)::BIGINT AS cnt FROM {CASES_TABLE} WHERE {p}"),
            None => format!("SELECT count(*)::BIGINT AS cnt FROM {CASES_TABLE}"),
        };
        let batches = self.query_arrow(&sql)?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0).max(0) as u64)
    }

    /// Predicate true when at least one tag flag is set.
    fn any_tag_set(&self) -> String {
        let flags: Vec<String> = self
            .registry
            .columns()
            .map(|c| format!("coalesce({c}, 0) <> 0"))
            .collect();
        if flags.is_empty() {
            "false".to_string()
        } else {
            format!("({})", flags.join(" OR "))
        }
    }

    fn tag_columns_list(&self) -> String {
        self.registry
            .columns()
            .map(|c| format!(", coalesce({c}, 0)::SMALLINT"))
            .collect()
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    fn untagged(&self, after_id: i64, limit: usize) -> Result<Vec<CaseRow>, StoreError> {
        let sql = format!(
            "SELECT id, product_name, coalesce(case_explanation, '') FROM {CASES_TABLE}
             WHERE id > ? AND NOT {} ORDER BY id LIMIT ?",
            self.any_tag_set()
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after_id, limit as i64], |row| {
            Ok(CaseRow {
                id: row.get(0)?,
                product_name: row.get(1)?,
                explanation: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn tagged(&self, after_id: i64, limit: usize) -> Result<Vec<HistoricalCase>, StoreError> {
        let sql = format!(
            "SELECT {CASE_COLUMNS}{} FROM {CASES_TABLE}
             WHERE id > ? AND {} ORDER BY id LIMIT ?",
            self.tag_columns_list(),
            self.any_tag_set()
        );
        let tags: Vec<&Tag> = self.registry.iter().collect();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after_id, limit as i64], |row| {
            let mut set = Vec::new();
            for (i, tag) in tags.iter().enumerate() {
                let flag: i16 = row.get(CASE_COLUMN_COUNT + i)?;
                if flag != 0 {
                    set.push((*tag).clone());
                }
            }
            let industry: Option<String> = row.get(6)?;
            Ok(HistoricalCase {
                id: row.get(0)?,
                product_name: row.get(1)?,
                explanation: row.get(2)?,
                law: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                date: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                link: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                industry: industry
                    .as_deref()
                    .map(Industry::parse_lenient)
                    .unwrap_or_default(),
                tags: set,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn apply(&self, assignments: &[TagAssignment]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut updated = 0;
        for assignment in assignments {
            let known: Vec<Tag> = assignment
                .tags
                .iter()
                .filter(|t| self.registry.recognises(t))
                .cloned()
                .collect();
            if known.is_empty() {
                continue;
            }
            let sql = format!("UPDATE {CASES_TABLE} SET {} WHERE id = ?", set_clause(&known));
            updated += tx.execute(&sql, params![assignment.case_id])?;
        }
        tx.commit()?;
        debug!(updated, batch = assignments.len(), "committed tag assignments");
        Ok(updated)
    }
}

fn set_clause(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| format!("{} = 1", t.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl CaseStore for DuckStore {
    async fn count_total(&self) -> Result<u64, StoreError> {
        self.blocking(|s| s.count_rows(None)).await
    }

    async fn count_where_tag_set(&self, tag: &Tag) -> Result<u64, StoreError> {
        if !self.registry.recognises(tag) {
            return Ok(0);
        }
        let predicate = format!("coalesce({}, 0) <> 0", tag.column());
        self.blocking(move |s| s.count_rows(Some(&predicate))).await
    }

    async fn list_untagged(&self, after_id: i64, limit: usize) -> Result<Vec<CaseRow>, StoreError> {
        self.blocking(move |s| s.untagged(after_id, limit)).await
    }

    async fn list_tagged(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<HistoricalCase>, StoreError> {
        self.blocking(move |s| s.tagged(after_id, limit)).await
    }

    async fn set_tag_columns(&self, assignments: &[TagAssignment]) -> Result<usize, StoreError> {
        let assignments = assignments.to_vec();
        self.blocking(move |s| s.apply(&assignments)).await
    }
}
