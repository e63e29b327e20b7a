//! Factor score tables.
//!
//! Scores arrive either as one composite value per (date, ticker) or as
//! several named factor columns per (date, ticker). The multi-factor form is
//! collapsed to a composite once, at the boundary, via
//! [`ScoreTable::into_composite`]; the simulator only ever sees
//! [`CompositeScores`].

use crate::domain::error::FactorTraderError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Name of the factor column preferred when collapsing multi-factor scores.
pub const COMPOSITE_COLUMN: &str = "composite_score";

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreTable {
    Composite(CompositeScores),
    MultiFactor(MultiFactorScores),
}

impl ScoreTable {
    /// Resolve to a single score per (date, ticker).
    ///
    /// Multi-factor tables use the `composite_score` column when present,
    /// otherwise the mean of the non-missing factor values for each ticker.
    pub fn into_composite(self) -> CompositeScores {
        match self {
            ScoreTable::Composite(scores) => scores,
            ScoreTable::MultiFactor(scores) => scores.collapse(),
        }
    }
}

/// Date → ticker → score. Missing and non-finite scores are never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeScores {
    rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl CompositeScores {
    pub fn new() -> Self {
        CompositeScores {
            rows: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, date: NaiveDate, ticker: impl Into<String>, score: f64) {
        let row = self.rows.entry(date).or_default();
        if score.is_finite() {
            row.insert(ticker.into(), score);
        }
    }

    /// Register a date with no usable scores so that it still counts as covered.
    pub fn insert_empty_row(&mut self, date: NaiveDate) {
        self.rows.entry(date).or_default();
    }

    pub fn has_date(&self, date: NaiveDate) -> bool {
        self.rows.contains_key(&date)
    }

    pub fn date_count(&self) -> usize {
        self.rows.len()
    }

    pub fn scores_on(&self, date: NaiveDate) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(&date)
    }

    /// Up to `n` highest-scoring tickers on `date`, best first. Ties break
    /// on ticker name. `None` when the date has no row at all.
    pub fn top_n(&self, date: NaiveDate, n: usize) -> Option<Vec<(String, f64)>> {
        let row = self.rows.get(&date)?;
        let mut ranked: Vec<(String, f64)> = row.iter().map(|(t, &s)| (t.clone(), s)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        Some(ranked)
    }

    pub fn slice(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> CompositeScores {
        let rows = self
            .rows
            .iter()
            .filter(|(d, _)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(d, r)| (*d, r.clone()))
            .collect();
        CompositeScores { rows }
    }
}

/// Date → ticker → one value per named factor.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiFactorScores {
    factors: Vec<String>,
    rows: BTreeMap<NaiveDate, BTreeMap<String, Vec<Option<f64>>>>,
}

impl MultiFactorScores {
    pub fn new(factors: Vec<String>) -> Result<Self, FactorTraderError> {
        if factors.is_empty() {
            return Err(FactorTraderError::invalid_input(
                "multi-factor score table needs at least one factor column",
            ));
        }
        Ok(MultiFactorScores {
            factors,
            rows: BTreeMap::new(),
        })
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn insert(
        &mut self,
        date: NaiveDate,
        ticker: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), FactorTraderError> {
        if values.len() != self.factors.len() {
            return Err(FactorTraderError::invalid_input(format!(
                "expected {} factor values, got {}",
                self.factors.len(),
                values.len()
            )));
        }
        self.rows
            .entry(date)
            .or_default()
            .insert(ticker.into(), values);
        Ok(())
    }

    fn collapse(self) -> CompositeScores {
        let composite_col = self.factors.iter().position(|f| f == COMPOSITE_COLUMN);
        let mut out = CompositeScores::new();
        for (date, tickers) in self.rows {
            out.insert_empty_row(date);
            for (ticker, values) in tickers {
                let score = match composite_col {
                    Some(col) => values[col].filter(|v| v.is_finite()),
                    None => mean_present(&values),
                };
                if let Some(s) = score {
                    out.insert(date, ticker, s);
                }
            }
        }
        out
    }
}

fn mean_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}
