//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::Utc;
use feed_core::{CellRef, CellValue, CellWrite, ColumnLetter, FeedError, Result, TabularStore};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

fn store_err(e: impl ToString) -> FeedError {
    FeedError::StoreUnreachable(e.to_string())
}

/// SQLite-based tabular store.
///
/// Cells live in a single `cells` table keyed by (tab, row, column). Numbers
/// and text are kept in separate columns so values read back with their type.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tabs (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(store_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cells (
                tab TEXT NOT NULL,
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                num REAL,
                text TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tab, col, row)
            )",
            [],
        )
        .map_err(store_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cells_tab_row ON cells(tab, row)",
            [],
        )
        .map_err(store_err)?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    fn require_tab(conn: &Connection, tab: &str) -> Result<()> {
        let found: Option<String> = conn
            .query_row("SELECT name FROM tabs WHERE name = ?1", params![tab], |row| {
                row.get(0)
            })
            .optional()
            .map_err(store_err)?;
        match found {
            Some(_) => Ok(()),
            None => Err(FeedError::StoreUnreachable(format!(
                "tab {tab:?} does not exist"
            ))),
        }
    }

    fn upsert(conn: &Connection, tab: &str, cell: CellRef, value: &CellValue) -> Result<()> {
        let (num, text) = match value {
            CellValue::Number(v) => (Some(*v), None),
            CellValue::Text(s) => (None, Some(s.as_str())),
            CellValue::Empty => {
                conn.execute(
                    "DELETE FROM cells WHERE tab = ?1 AND row = ?2 AND col = ?3",
                    params![tab, cell.row, cell.column.index()],
                )
                .map_err(store_err)?;
                return Ok(());
            }
        };
        conn.execute(
            "INSERT OR REPLACE INTO cells (tab, row, col, num, text, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                tab,
                cell.row,
                cell.column.index(),
                num,
                text,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

fn cell_text(num: Option<f64>, text: Option<String>) -> String {
    match (num, text) {
        (Some(v), _) => CellValue::Number(v).as_text(),
        (None, Some(s)) => s,
        (None, None) => String::new(),
    }
}

#[async_trait]
impl TabularStore for SqliteStore {
    #[instrument(skip(self))]
    async fn ensure_tab(&self, tab: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        let created = conn
            .execute(
                "INSERT OR IGNORE INTO tabs (name, created_at) VALUES (?1, ?2)",
                params![tab, Utc::now().to_rfc3339()],
            )
            .map_err(store_err)?;
        if created > 0 {
            debug!("Created tab");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(column = %column))]
    async fn read_column(&self, tab: &str, column: ColumnLetter, start_row: u32) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(store_err)?;
        Self::require_tab(&conn, tab)?;

        let mut stmt = conn
            .prepare(
                "SELECT row, num, text FROM cells
                 WHERE tab = ?1 AND col = ?2 AND row >= ?3
                 ORDER BY row ASC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![tab, column.index(), start_row], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut values: Vec<String> = Vec::new();
        for row in rows {
            let (row, num, text) = row.map_err(store_err)?;
            let text = cell_text(num, text);
            if text.is_empty() {
                continue;
            }
            values.resize((row - start_row) as usize, String::new());
            values.push(text);
        }
        debug!("Read {} cells", values.len());
        Ok(values)
    }

    #[instrument(skip(self, value), fields(cell = %cell))]
    async fn write_cell(&self, tab: &str, cell: CellRef, value: CellValue) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        Self::require_tab(&conn, tab)?;
        Self::upsert(&conn, tab, cell, &value)
    }

    #[instrument(skip(self, writes), fields(count = writes.len()))]
    async fn write_cells(&self, tab: &str, writes: &[CellWrite]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(store_err)?;
        Self::require_tab(&conn, tab)?;

        let tx = conn.transaction().map_err(store_err)?;
        for write in writes {
            Self::upsert(&tx, tab, write.cell, &write.value)?;
        }
        tx.commit().map_err(store_err)?;

        debug!("Wrote {} cells", writes.len());
        Ok(writes.len())
    }

    #[instrument(skip(self))]
    async fn read_header_row(&self, tab: &str, row: u32) -> Result<HashMap<String, ColumnLetter>> {
        let conn = self.conn.lock().map_err(store_err)?;
        Self::require_tab(&conn, tab)?;

        let mut stmt = conn
            .prepare("SELECT col, num, text FROM cells WHERE tab = ?1 AND row = ?2")
            .map_err(store_err)?;
        let cells = stmt
            .query_map(params![tab, row], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, Option<f64>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut headers = HashMap::new();
        for cell in cells {
            let (col, num, text) = cell.map_err(store_err)?;
            let text = cell_text(num, text);
            let text = text.trim();
            if !text.is_empty() {
                headers.insert(text.to_string(), ColumnLetter::from_index(col));
            }
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(s: &str) -> ColumnLetter {
        ColumnLetter::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_tab("Prices").await.unwrap();
        store.ensure_tab("Prices").await.unwrap();

        store
            .write_cells(
                "Prices",
                &[
                    CellWrite::new(CellRef::new(1, col("A")), "Ticker"),
                    CellWrite::new(CellRef::new(2, col("A")), "AAPL"),
                    CellWrite::new(CellRef::new(4, col("A")), "NVDA"),
                    CellWrite::new(CellRef::new(2, col("B")), 231.5),
                ],
            )
            .await
            .unwrap();

        let tickers = store.read_column("Prices", col("A"), 2).await.unwrap();
        assert_eq!(tickers, vec!["AAPL", "", "NVDA"]);

        let prices = store.read_column("Prices", col("B"), 2).await.unwrap();
        assert_eq!(prices, vec!["231.5"]);

        let headers = store.read_header_row("Prices", 1).await.unwrap();
        assert_eq!(headers.get("Ticker"), Some(&col("A")));
    }

    #[tokio::test]
    async fn test_sqlite_overwrite_and_clear() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_tab("Prices").await.unwrap();
        let cell = CellRef::new(2, col("C"));

        store.write_cell("Prices", cell, CellValue::Number(1.0)).await.unwrap();
        store.write_cell("Prices", cell, CellValue::not_available()).await.unwrap();
        assert_eq!(store.read_column("Prices", col("C"), 2).await.unwrap(), vec!["N/A"]);

        store.write_cell("Prices", cell, CellValue::Empty).await.unwrap();
        assert!(store.read_column("Prices", col("C"), 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_missing_tab() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .write_cell("Nope", CellRef::new(1, col("A")), CellValue::Empty)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::StoreUnreachable(_)));
    }
}
