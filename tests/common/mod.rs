#![allow(dead_code)]

use chrono::NaiveDate;
use factortrader::domain::backtest::BacktestConfig;
use factortrader::domain::error::FactorTraderError;
use factortrader::domain::execution::ExecutionConfig;
use factortrader::domain::optimizer::{OptimizationMethod, PortfolioConfig};
use factortrader::domain::price_table::PriceTable;
use factortrader::domain::rebalance::RebalanceFrequency;
use factortrader::domain::score_table::{CompositeScores, ScoreTable};
use factortrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub prices: PriceTable,
    pub scores: CompositeScores,
    pub sectors: HashMap<String, String>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(prices: PriceTable, scores: CompositeScores) -> Self {
        Self {
            prices,
            scores,
            sectors: HashMap::new(),
            error: None,
        }
    }

    pub fn with_sector(mut self, ticker: &str, sector: &str) -> Self {
        self.sectors.insert(ticker.to_string(), sector.to_string());
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_prices(&self) -> Result<PriceTable, FactorTraderError> {
        if let Some(reason) = &self.error {
            return Err(FactorTraderError::data(reason.clone()));
        }
        Ok(self.prices.clone())
    }

    fn load_scores(&self) -> Result<ScoreTable, FactorTraderError> {
        Ok(ScoreTable::Composite(self.scores.clone()))
    }

    fn load_sectors(&self) -> Result<HashMap<String, String>, FactorTraderError> {
        Ok(self.sectors.clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive calendar days from `start`, one per row.
pub fn price_table(start: NaiveDate, tickers: &[&str], rows: Vec<Vec<f64>>) -> PriceTable {
    let dates = (0..rows.len())
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect();
    PriceTable::new(
        dates,
        tickers.iter().map(|t| t.to_string()).collect(),
        rows.into_iter()
            .map(|r| r.into_iter().map(Some).collect())
            .collect(),
    )
    .unwrap()
}

/// `days` rows of deterministic, non-trivial price paths for `tickers`.
pub fn synthetic_prices(start: NaiveDate, tickers: &[&str], days: usize) -> PriceTable {
    let rows = (0..days)
        .map(|t| {
            tickers
                .iter()
                .enumerate()
                .map(|(k, _)| {
                    let drift = 1.0 + 0.0005 * (k as f64 + 1.0);
                    let wiggle = 0.01 * (k as f64 + 1.0) * ((t as f64) * (0.7 + k as f64)).sin();
                    100.0 * drift.powi(t as i32) * (1.0 + wiggle)
                })
                .collect()
        })
        .collect();
    price_table(start, tickers, rows)
}

/// The same score for every ticker on every listed date.
pub fn flat_scores(dates: &[NaiveDate], tickers: &[&str]) -> CompositeScores {
    let mut scores = CompositeScores::new();
    for d in dates {
        for (rank, t) in tickers.iter().enumerate() {
            scores.insert(*d, *t, 1.0 - rank as f64 * 0.01);
        }
    }
    scores
}

/// Frictionless daily rebalancing with no history requirement beyond two returns.
pub fn frictionless_config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 100_000.0,
        rebalance_frequency: RebalanceFrequency::Daily,
        execution: ExecutionConfig {
            transaction_cost: 0.0,
            slippage: 0.0,
        },
        benchmark: None,
        min_history_days: 1,
        ..BacktestConfig::default()
    }
}

pub fn unconstrained_portfolio(method: OptimizationMethod) -> PortfolioConfig {
    PortfolioConfig {
        method,
        max_position_size: 1.0,
        min_position_size: 0.0,
        max_turnover: 2.0,
        max_sector_weight: 1.0,
        ..PortfolioConfig::default()
    }
}
