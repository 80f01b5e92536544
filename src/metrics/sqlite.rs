//! SQLite-backed metrics store

use crate::error::{LyraError, LyraResult};
use crate::metrics::query::{Category, MetricRow, MetricsQuery};
use crate::metrics::MetricsStore;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS DTMetrics (
    catchidn INTEGER NOT NULL,
    variable INTEGER NOT NULL,
    year     INTEGER NOT NULL,
    month    INTEGER NOT NULL,
    value    REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dtmetrics_lookup
    ON DTMetrics (catchidn, variable, year, month);
CREATE TABLE IF NOT EXISTS DTMetricsCategories (
    id            INTEGER PRIMARY KEY,
    variable      INTEGER NOT NULL UNIQUE,
    variable_name TEXT    NOT NULL
);
";

/// Metrics tables in a SQLite database
#[derive(Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    identity: String,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> LyraResult<Self> {
        let conn = Connection::open(path)?;
        let identity = std::path::absolute(path)
            .unwrap_or_else(|_| PathBuf::from(path))
            .display()
            .to_string();
        Self::with_connection(conn, identity)
    }

    /// Private in-memory database
    pub fn in_memory() -> LyraResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, format!("memory:{}", Uuid::new_v4()))
    }

    fn with_connection(conn: Connection, identity: String) -> LyraResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            identity,
        })
    }

    fn lock(&self) -> LyraResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }

    /// Run a query against the connection on the blocking pool
    async fn read<T, F>(&self, query: F) -> LyraResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> LyraResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| poisoned())?;
            query(&conn)
        })
        .await
        .map_err(|e| LyraError::Internal(format!("metrics query task failed: {}", e)))?
    }

    /// Append rows in one transaction
    pub fn insert_rows(&self, rows: &[MetricRow]) -> LyraResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO DTMetrics (catchidn, variable, year, month, value) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in rows {
                stmt.execute(params![r.catchidn, r.variable, r.year, r.month, r.value])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Register or rename a variable code
    pub fn insert_category(&self, variable: i64, variable_name: &str) -> LyraResult<()> {
        self.lock()?.execute(
            "INSERT INTO DTMetricsCategories (variable, variable_name) VALUES (?1, ?2) \
             ON CONFLICT(variable) DO UPDATE SET variable_name = excluded.variable_name",
            params![variable, variable_name],
        )?;
        Ok(())
    }
}

fn poisoned() -> LyraError {
    LyraError::Internal("metrics connection lock poisoned".to_string())
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn categories(&self) -> LyraResult<Vec<Category>> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, variable, variable_name FROM DTMetricsCategories ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    variable: row.get(1)?,
                    variable_name: row.get(2)?,
                })
            })?;
            let out = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(out)
        })
        .await
    }

    async fn fetch(&self, query: &MetricsQuery) -> LyraResult<Vec<MetricRow>> {
        let (sql, params) = query.to_sql();
        debug!("Metrics query with {} parameters", params.len());

        self.read(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                Ok(MetricRow {
                    catchidn: row.get(0)?,
                    variable: row.get(1)?,
                    year: row.get(2)?,
                    month: row.get(3)?,
                    value: row.get(4)?,
                })
            })?;
            let out = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(out)
        })
        .await
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(catchidn: i64, variable: i64, year: i32, month: u32, value: f64) -> MetricRow {
        MetricRow {
            catchidn,
            variable,
            year,
            month,
            value,
        }
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_category(1, "runoff").unwrap();
        store.insert_category(2, "rainfall").unwrap();
        store
            .insert_rows(&[
                row(23, 1, 2020, 2, 4.0),
                row(10, 1, 2020, 1, 1.5),
                row(10, 2, 2020, 1, 9.0),
                row(10, 1, 2019, 12, 2.5),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn categories_in_id_order() {
        let store = seeded();
        let cats = store.categories().await.unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].variable_name, "runoff");
    }

    #[tokio::test]
    async fn insert_category_renames() {
        let store = seeded();
        store.insert_category(1, "surface_runoff").unwrap();
        let cats = store.categories().await.unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].variable_name, "surface_runoff");
    }

    #[tokio::test]
    async fn fetch_is_filtered_and_ordered() {
        let store = seeded();
        let rows = store
            .fetch(&MetricsQuery::new().catchidns([10]).variables([1]))
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![row(10, 1, 2019, 12, 2.5), row(10, 1, 2020, 1, 1.5)]
        );
    }

    #[tokio::test]
    async fn unfiltered_fetch_returns_everything() {
        let store = seeded();
        let rows = store.fetch(&MetricsQuery::new()).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].catchidn, 23);
    }

    #[tokio::test]
    async fn no_match_is_empty_vec() {
        let store = seeded();
        let rows = store
            .fetch(&MetricsQuery::new().catchidns([9999]))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_share_one_connection() {
        let store = Arc::new(seeded());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.fetch(&MetricsQuery::new()).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 4);
        }
    }

    #[tokio::test]
    async fn file_database_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_rows(&[row(10, 1, 2020, 1, 1.0)]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.fetch(&MetricsQuery::new()).await.unwrap().len(), 1);
        assert_eq!(store.identity(), std::path::absolute(&path).unwrap().display().to_string());
    }
}
