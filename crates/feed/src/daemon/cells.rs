//! Where each quote field lands in the tab.

use std::collections::HashMap;

use feed_core::{CellRef, CellValue, CellWrite, ColumnLetter, Quote, Symbol};

use super::config::{DaemonConfig, Orientation};

const TICKER_HEADER: &str = "Ticker";
const CLOSE_HEADER: &str = "Close Price";
const PREVIOUS_CLOSE_HEADER: &str = "Previous Close Price";
const EXTENDED_HEADER: &str = "Extended Hour Price";
const DIFF_HEADER: &str = "Percentage Change";
const MARKET_PRICE_HEADER: &str = "Market Price(with extended hour)";
const PCT_CHANGE_HEADER: &str = "% Change Since Last Close";

/// One tracked ticker and its position along the layout axis.
///
/// For tickers read from the store the position counts blank cells too, so
/// it maps back to the row the ticker was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TickerSlot {
    pub(crate) symbol: Symbol,
    pub(crate) position: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Layout<'a> {
    config: &'a DaemonConfig,
}

impl<'a> Layout<'a> {
    pub(crate) const fn new(config: &'a DaemonConfig) -> Self {
        Self { config }
    }

    fn cell(&self, column: ColumnLetter, position: u32, stride: u32) -> CellRef {
        match self.config.orientation {
            Orientation::Vertical => CellRef::new(self.config.start_row + position, column),
            Orientation::Horizontal => CellRef::new(self.config.start_row, column.offset(position * stride)),
        }
    }

    /// The extended price cell and, with `include_change`, the change cell beside it.
    fn extended_cells(&self, extended: ColumnLetter, position: u32) -> (CellRef, Option<CellRef>) {
        if !self.config.include_change {
            return (self.cell(extended, position, 1), None);
        }
        let price = self.cell(extended, position, 2);
        (price, Some(CellRef::new(price.row, price.column.offset(1))))
    }

    /// Cells for one ticker. `None` marks a failed fetch: every value becomes `N/A`.
    pub(crate) fn quote_writes(&self, slot: &TickerSlot, quote: Option<&Quote>) -> Vec<CellWrite> {
        let columns = &self.config.columns;
        let session = self.config.session;
        let mut writes = Vec::new();

        if let Some(col) = self.config.writable_ticker_column() {
            writes.push(CellWrite::new(self.cell(col, slot.position, 1), slot.symbol.as_str()));
        }
        if let Some(col) = columns.extended {
            let (price, change) = self.extended_cells(col, slot.position);
            writes.push(CellWrite::new(
                price,
                CellValue::number_or_na(quote.map(|q| q.market_price(session))),
            ));
            if let Some(change) = change {
                // Without an extended price, show the regular session's move instead.
                let pct = quote.and_then(|q| match q.extended_hours_price(session) {
                    Some(_) => q.pct_change_vs_regular(session),
                    None => q.pct_change_since_close(session),
                });
                let value = match pct {
                    Some(pct) => CellValue::percent_or_na(Some(pct)),
                    None => CellValue::Empty,
                };
                writes.push(CellWrite::new(change, value));
            }
        }

        let optional = [
            (columns.close, CellValue::number_or_na(quote.and_then(Quote::close))),
            (
                columns.previous_close,
                CellValue::number_or_na(quote.and_then(|q| q.previous_close)),
            ),
            (
                columns.diff,
                CellValue::percent_or_na(quote.and_then(|q| q.pct_change_vs_regular(session))),
            ),
            (
                columns.market_price,
                CellValue::number_or_na(quote.map(|q| q.market_price(session))),
            ),
            (
                columns.pct_change,
                CellValue::percent_or_na(quote.and_then(|q| q.pct_change_since_close(session))),
            ),
        ];
        for (column, value) in optional {
            if let Some(col) = column {
                writes.push(CellWrite::new(self.cell(col, slot.position, 1), value));
            }
        }
        writes
    }

    /// Header labels for the row above the data, skipping labels already in place.
    ///
    /// Empty when the data starts on row 1.
    pub(crate) fn header_writes(&self, existing: &HashMap<String, ColumnLetter>) -> Vec<CellWrite> {
        if self.config.start_row <= 1 {
            return Vec::new();
        }
        let row = self.config.start_row - 1;
        let columns = &self.config.columns;
        let labels = [
            (self.config.writable_ticker_column(), TICKER_HEADER),
            (columns.close, CLOSE_HEADER),
            (columns.previous_close, PREVIOUS_CLOSE_HEADER),
            (columns.extended, EXTENDED_HEADER),
            (columns.diff, DIFF_HEADER),
            (columns.market_price, MARKET_PRICE_HEADER),
            (columns.pct_change, PCT_CHANGE_HEADER),
        ];

        labels
            .into_iter()
            .filter_map(|(column, label)| column.map(|c| (c, label)))
            .filter(|(column, label)| existing.get(*label) != Some(column))
            .map(|(column, label)| CellWrite::new(CellRef::new(row, column), label))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::config::TickerSource;
    use chrono::Utc;
    use feed_core::{ExtendedSession, MarketState};

    fn col(s: &str) -> ColumnLetter {
        ColumnLetter::parse(s).unwrap()
    }

    fn slot(symbol: &str, position: u32) -> TickerSlot {
        TickerSlot {
            symbol: Symbol::new(symbol),
            position,
        }
    }

    fn quote() -> Quote {
        Quote::new(Symbol::new("AAPL"), 100.0, Utc::now())
            .with_previous_close(Some(98.0))
            .with_post_market_price(Some(101.0))
            .with_market_state(MarketState::Post)
    }

    fn config() -> DaemonConfig {
        let mut config = DaemonConfig::new(TickerSource::List(vec![Symbol::new("AAPL")]), col("D"));
        config.columns.ticker = Some(col("A"));
        config.columns.close = Some(col("B"));
        config.columns.previous_close = Some(col("C"));
        config.columns.diff = Some(col("E"));
        config.columns.market_price = Some(col("F"));
        config.columns.pct_change = Some(col("G"));
        config
    }

    fn value_at(writes: &[CellWrite], cell: &str) -> Option<CellValue> {
        writes
            .iter()
            .find(|w| w.cell.to_string() == cell)
            .map(|w| w.value.clone())
    }

    #[test]
    fn test_vertical_quote_cells() {
        let config = config();
        let writes = Layout::new(&config).quote_writes(&slot("AAPL", 3), Some(&quote()));
        assert_eq!(writes.len(), 7);
        assert_eq!(value_at(&writes, "A5"), Some(CellValue::Text("AAPL".into())));
        assert_eq!(value_at(&writes, "B5"), Some(CellValue::Number(100.0)));
        assert_eq!(value_at(&writes, "C5"), Some(CellValue::Number(98.0)));
        assert_eq!(value_at(&writes, "D5"), Some(CellValue::Number(101.0)));
        assert_eq!(value_at(&writes, "E5"), Some(CellValue::Number(1.0)));
        assert_eq!(value_at(&writes, "F5"), Some(CellValue::Number(101.0)));
        assert_eq!(value_at(&writes, "G5"), Some(CellValue::Number(3.06)));
    }

    #[test]
    fn test_close_is_na_during_regular_session() {
        let config = config();
        let q = quote().with_market_state(MarketState::Regular);
        let writes = Layout::new(&config).quote_writes(&slot("AAPL", 0), Some(&q));
        assert_eq!(value_at(&writes, "B2"), Some(CellValue::not_available()));
    }

    #[test]
    fn test_failed_fetch_writes_na() {
        let config = config();
        let writes = Layout::new(&config).quote_writes(&slot("AAPL", 0), None);
        assert_eq!(value_at(&writes, "A2"), Some(CellValue::Text("AAPL".into())));
        for cell in ["B2", "C2", "D2", "E2", "F2", "G2"] {
            assert_eq!(value_at(&writes, cell), Some(CellValue::not_available()), "{cell}");
        }
    }

    #[test]
    fn test_horizontal_with_change_pairs() {
        let mut config = config();
        config.orientation = Orientation::Horizontal;
        config.include_change = true;
        config.columns = Default::default();
        config.columns.extended = Some(col("B"));
        config.session = ExtendedSession::Pre;

        let layout = Layout::new(&config);
        let first = layout.quote_writes(&slot("AAPL", 0), Some(&quote()));
        let second = layout.quote_writes(&slot("MSFT", 1), Some(&quote()));

        // No pre-market price: regular price, change against the previous close.
        assert_eq!(value_at(&first, "B2"), Some(CellValue::Number(100.0)));
        assert_eq!(value_at(&first, "C2"), Some(CellValue::Number(2.04)));
        assert_eq!(value_at(&second, "D2"), Some(CellValue::Number(100.0)));
        assert_eq!(value_at(&second, "E2"), Some(CellValue::Number(2.04)));

        let failed = layout.quote_writes(&slot("AAPL", 0), None);
        assert_eq!(value_at(&failed, "C2"), Some(CellValue::Empty));

        config.session = ExtendedSession::Post;
        let post = Layout::new(&config).quote_writes(&slot("AAPL", 0), Some(&quote()));
        assert_eq!(value_at(&post, "B2"), Some(CellValue::Number(101.0)));
        assert_eq!(value_at(&post, "C2"), Some(CellValue::Number(1.0)));
    }

    #[test]
    fn test_headers() {
        let config = config();
        let layout = Layout::new(&config);
        let writes = layout.header_writes(&HashMap::new());
        assert_eq!(writes.len(), 7);
        assert_eq!(value_at(&writes, "A1"), Some(CellValue::Text(TICKER_HEADER.into())));
        assert_eq!(value_at(&writes, "D1"), Some(CellValue::Text(EXTENDED_HEADER.into())));
        assert_eq!(value_at(&writes, "G1"), Some(CellValue::Text(PCT_CHANGE_HEADER.into())));

        let existing = HashMap::from([(TICKER_HEADER.to_string(), col("A"))]);
        assert_eq!(layout.header_writes(&existing).len(), 6);

        let mut top = config.clone();
        top.start_row = 1;
        assert!(Layout::new(&top).header_writes(&HashMap::new()).is_empty());
    }

    #[test]
    fn test_store_sourced_ticker_column_is_not_written() {
        let mut config = config();
        config.tickers = TickerSource::Store;
        let writes = Layout::new(&config).quote_writes(&slot("AAPL", 0), Some(&quote()));
        assert_eq!(value_at(&writes, "A2"), None);
        assert!(Layout::new(&config).header_writes(&HashMap::new()).iter().all(|w| w.cell.column != col("A")));
    }
}
