//! In-memory store implementation.

use async_trait::async_trait;
use feed_core::{CellRef, CellValue, ColumnLetter, FeedError, Result, TabularStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cells of one tab keyed by (row, column index).
type Tab = BTreeMap<(u32, u32), CellValue>;

/// Simple in-memory store for testing and development.
///
/// Tabs are kept in an `RwLock`-protected `HashMap` and are lost when the store
/// is dropped. The store can be switched offline to simulate an unreachable
/// backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tabs: RwLock<HashMap<String, Tab>>,
    offline: AtomicBool,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`FeedError::StoreUnreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Replaces a column's contents from `start_row` down with `values`.
    pub async fn set_column(&self, tab: &str, column: ColumnLetter, start_row: u32, values: &[&str]) {
        let mut tabs = self.tabs.write().await;
        let cells = tabs.entry(tab.to_string()).or_default();
        cells.retain(|(row, col), _| *col != column.index() || *row < start_row);
        for (i, value) in values.iter().enumerate() {
            cells.insert(
                (start_row + i as u32, column.index()),
                CellValue::Text((*value).to_string()),
            );
        }
    }

    /// Returns the value of one cell, if set.
    pub async fn cell(&self, tab: &str, cell: CellRef) -> Option<CellValue> {
        let tabs = self.tabs.read().await;
        tabs.get(tab)?.get(&(cell.row, cell.column.index())).cloned()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FeedError::StoreUnreachable("store is offline".to_string()));
        }
        Ok(())
    }
}

fn missing_tab(tab: &str) -> FeedError {
    FeedError::StoreUnreachable(format!("tab {tab:?} does not exist"))
}

#[async_trait]
impl TabularStore for InMemoryStore {
    #[instrument(skip(self))]
    async fn ensure_tab(&self, tab: &str) -> Result<()> {
        self.check_online()?;
        let mut tabs = self.tabs.write().await;
        if !tabs.contains_key(tab) {
            tabs.insert(tab.to_string(), Tab::new());
            debug!("Created tab");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(column = %column))]
    async fn read_column(&self, tab: &str, column: ColumnLetter, start_row: u32) -> Result<Vec<String>> {
        self.check_online()?;
        let tabs = self.tabs.read().await;
        let cells = tabs.get(tab).ok_or_else(|| missing_tab(tab))?;

        let mut values: Vec<String> = Vec::new();
        for ((row, col), value) in cells.range((start_row, 0)..) {
            if *col != column.index() {
                continue;
            }
            let text = value.as_text();
            if text.is_empty() {
                continue;
            }
            let offset = (row - start_row) as usize;
            values.resize(offset, String::new());
            values.push(text);
        }
        debug!("Read {} cells", values.len());
        Ok(values)
    }

    #[instrument(skip(self, value), fields(cell = %cell))]
    async fn write_cell(&self, tab: &str, cell: CellRef, value: CellValue) -> Result<()> {
        self.check_online()?;
        let mut tabs = self.tabs.write().await;
        let cells = tabs.get_mut(tab).ok_or_else(|| missing_tab(tab))?;
        match value {
            CellValue::Empty => {
                cells.remove(&(cell.row, cell.column.index()));
            }
            value => {
                cells.insert((cell.row, cell.column.index()), value);
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_header_row(&self, tab: &str, row: u32) -> Result<HashMap<String, ColumnLetter>> {
        self.check_online()?;
        let tabs = self.tabs.read().await;
        let cells = tabs.get(tab).ok_or_else(|| missing_tab(tab))?;
        Ok(cells
            .range((row, 0)..(row + 1, 0))
            .filter_map(|((_, col), value)| {
                let text = value.as_text();
                let text = text.trim();
                (!text.is_empty()).then(|| (text.to_string(), ColumnLetter::from_index(*col)))
            })
            .collect())
    }
}
