//! Date × ticker price matrix consumed by the simulator.

use crate::domain::error::FactorTraderError;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    ticker_index: HashMap<String, usize>,
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    /// Build a table, rejecting anything the simulation loop cannot use:
    /// no dates, no tickers, ragged rows, unsorted or duplicate dates,
    /// duplicate tickers, and non-positive or non-finite prices.
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, FactorTraderError> {
        if dates.is_empty() {
            return Err(FactorTraderError::invalid_input("price table has no dates"));
        }
        if tickers.is_empty() {
            return Err(FactorTraderError::invalid_input("price table has no tickers"));
        }
        if rows.len() != dates.len() {
            return Err(FactorTraderError::invalid_input(format!(
                "price table has {} dates but {} rows",
                dates.len(),
                rows.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(FactorTraderError::invalid_input(format!(
                "price dates must be strictly ascending ({} followed by {})",
                w[0], w[1]
            )));
        }

        let mut ticker_index = HashMap::with_capacity(tickers.len());
        for (i, t) in tickers.iter().enumerate() {
            if ticker_index.insert(t.clone(), i).is_some() {
                return Err(FactorTraderError::invalid_input(format!(
                    "duplicate ticker in price table: {t}"
                )));
            }
        }

        for (date, row) in dates.iter().zip(&rows) {
            if row.len() != tickers.len() {
                return Err(FactorTraderError::invalid_input(format!(
                    "price row for {} has {} values, expected {}",
                    date,
                    row.len(),
                    tickers.len()
                )));
            }
            for (ticker, price) in tickers.iter().zip(row) {
                if let Some(p) = price {
                    if !(p.is_finite() && *p > 0.0) {
                        return Err(FactorTraderError::invalid_input(format!(
                            "invalid price {p} for {ticker} on {date}"
                        )));
                    }
                }
            }
        }

        Ok(PriceTable {
            dates,
            tickers,
            ticker_index,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, index: usize) -> NaiveDate {
        self.dates[index]
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.ticker_index.contains_key(ticker)
    }

    pub fn price(&self, index: usize, ticker: &str) -> Option<f64> {
        let col = *self.ticker_index.get(ticker)?;
        self.rows.get(index)?.get(col).copied().flatten()
    }

    /// All available prices on one date.
    pub fn price_map(&self, index: usize) -> HashMap<String, f64> {
        self.tickers
            .iter()
            .zip(&self.rows[index])
            .filter_map(|(t, p)| p.map(|p| (t.clone(), p)))
            .collect()
    }

    /// Restrict to `[start, end]` (either bound optional).
    pub fn slice(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceTable, FactorTraderError> {
        let (dates, rows): (Vec<_>, Vec<_>) = self
            .dates
            .iter()
            .zip(&self.rows)
            .filter(|(d, _)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(d, r)| (*d, r.clone()))
            .unzip();
        PriceTable::new(dates, self.tickers.clone(), rows)
    }

    /// Daily percentage returns for one ticker, aligned with `dates()`.
    /// Entry `i` is `None` when either price `i-1` or `i` is missing.
    pub fn returns(&self, ticker: &str) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(self.len());
        out.push(None);
        for i in 1..self.len() {
            let r = match (self.price(i - 1, ticker), self.price(i, ticker)) {
                (Some(prev), Some(curr)) => Some(curr / prev - 1.0),
                _ => None,
            };
            out.push(r);
        }
        out
    }

    /// Daily returns for `tickers` over rows `[end - lookback, end]`.
    ///
    /// Each returned row holds one return per ticker, in `tickers` order.
    /// A day is dropped entirely if any ticker lacks a price on it or on the
    /// day before.
    pub fn trailing_returns(&self, end: usize, lookback: usize, tickers: &[String]) -> Vec<Vec<f64>> {
        let start = end.saturating_sub(lookback);
        let mut out = Vec::with_capacity(end - start);
        for i in (start + 1)..=end {
            let row: Option<Vec<f64>> = tickers
                .iter()
                .map(|t| match (self.price(i - 1, t), self.price(i, t)) {
                    (Some(prev), Some(curr)) => Some(curr / prev - 1.0),
                    _ => None,
                })
                .collect();
            if let Some(row) = row {
                out.push(row);
            }
        }
        out
    }
}
