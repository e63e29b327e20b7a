//! Weight-diff trade execution with proportional costs.
//!
//! Trades are sized in value space: `(target - current) * portfolio_value`.
//! Share counts are derived for the log only and never feed back into
//! portfolio accounting.

use chrono::NaiveDate;
use log::warn;
use serde::Serialize;
use std::collections::HashMap;

use super::weights::Weights;

/// Weight changes smaller than this are not traded.
pub const MIN_WEIGHT_CHANGE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Fraction of trade value charged as commission.
    pub transaction_cost: f64,
    /// Fraction of trade value lost to price impact. Charged on buys and sells alike.
    pub slippage: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            transaction_cost: 0.001,
            slippage: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    /// Signed; informational.
    pub shares: f64,
    pub price: f64,
    /// Signed currency value, positive for buys.
    pub value: f64,
    pub cost: f64,
    pub side: Side,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub trades: Vec<Trade>,
    pub total_cost: f64,
}

/// Commission plus slippage on a trade of `trade_value` (either sign).
pub fn calculate_cost(trade_value: f64, config: &ExecutionConfig) -> f64 {
    let notional = trade_value.abs();
    config.transaction_cost * notional + config.slippage * notional
}

/// Trades moving `current` to `target` at `prices`.
///
/// Tickers are visited in sorted order over the union of both weight sets.
/// A ticker without a price is skipped with a warning; its cost is simply
/// absent. The caller deducts `total_cost` from portfolio value once.
pub fn execute(
    date: NaiveDate,
    current: &Weights,
    target: &Weights,
    prices: &HashMap<String, f64>,
    portfolio_value: f64,
    config: &ExecutionConfig,
) -> Execution {
    let mut execution = Execution::default();

    for ticker in target.union_tickers(current) {
        let delta = target.get(ticker) - current.get(ticker);
        if delta.abs() < MIN_WEIGHT_CHANGE {
            continue;
        }
        let Some(&price) = prices.get(ticker) else {
            warn!("no price for {ticker} on {date}, skipping trade");
            continue;
        };

        let value = delta * portfolio_value;
        let cost = calculate_cost(value, config);
        execution.total_cost += cost;
        execution.trades.push(Trade {
            date,
            ticker: ticker.to_string(),
            shares: value / price,
            price,
            value,
            cost,
            side: if value > 0.0 { Side::Buy } else { Side::Sell },
        });
    }

    execution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn cost_is_both_components() {
        let config = ExecutionConfig {
            transaction_cost: 0.001,
            slippage: 0.0005,
        };
        let cost = calculate_cost(10_000.0, &config);
        assert!((cost - 15.0).abs() < 1e-9);
        assert!((calculate_cost(-10_000.0, &config) - cost).abs() < f64::EPSILON);
    }

    #[test]
    fn initial_buy_from_cash() {
        let target = Weights::from_pairs([("A", 0.6), ("B", 0.4)]);
        let exec = execute(
            date(),
            &Weights::new(),
            &target,
            &prices(&[("A", 100.0), ("B", 50.0)]),
            100_000.0,
            &ExecutionConfig::default(),
        );
        assert_eq!(exec.trades.len(), 2);
        let a = &exec.trades[0];
        assert_eq!(a.ticker, "A");
        assert_eq!(a.side, Side::Buy);
        assert!((a.value - 60_000.0).abs() < 1e-9);
        assert!((a.shares - 600.0).abs() < 1e-9);
        assert!((exec.total_cost - 100_000.0 * 0.0015).abs() < 1e-9);
    }

    #[test]
    fn reductions_are_sells() {
        let current = Weights::from_pairs([("A", 0.5), ("B", 0.5)]);
        let target = Weights::from_pairs([("A", 0.3), ("B", 0.7)]);
        let exec = execute(
            date(),
            &current,
            &target,
            &prices(&[("A", 10.0), ("B", 10.0)]),
            1_000.0,
            &ExecutionConfig::default(),
        );
        assert_eq!(exec.trades[0].side, Side::Sell);
        assert!(exec.trades[0].shares < 0.0);
        assert_eq!(exec.trades[1].side, Side::Buy);
    }

    #[test]
    fn tiny_changes_are_ignored() {
        let current = Weights::from_pairs([("A", 0.5), ("B", 0.5)]);
        let target = Weights::from_pairs([("A", 0.5005), ("B", 0.4995)]);
        let exec = execute(
            date(),
            &current,
            &target,
            &prices(&[("A", 10.0), ("B", 10.0)]),
            1_000_000.0,
            &ExecutionConfig::default(),
        );
        assert!(exec.trades.is_empty());
        assert_eq!(exec.total_cost, 0.0);
    }

    #[test]
    fn unchanged_weights_cost_nothing() {
        let w = Weights::from_pairs([("A", 0.25), ("B", 0.75)]);
        let exec = execute(
            date(),
            &w,
            &w,
            &prices(&[("A", 10.0), ("B", 10.0)]),
            1_000_000.0,
            &ExecutionConfig::default(),
        );
        assert!(exec.trades.is_empty());
        assert_eq!(exec.total_cost, 0.0);
    }

    #[test]
    fn missing_price_skips_ticker() {
        let target = Weights::from_pairs([("A", 0.5), ("B", 0.5)]);
        let exec = execute(
            date(),
            &Weights::new(),
            &target,
            &prices(&[("A", 10.0)]),
            1_000.0,
            &ExecutionConfig::default(),
        );
        assert_eq!(exec.trades.len(), 1);
        assert_eq!(exec.trades[0].ticker, "A");
        assert!((exec.total_cost - 500.0 * 0.0015).abs() < 1e-9);
    }

    #[test]
    fn full_exit_sells_everything() {
        let current = Weights::from_pairs([("A", 1.0)]);
        let target = Weights::from_pairs([("B", 1.0)]);
        let exec = execute(
            date(),
            &current,
            &target,
            &prices(&[("A", 20.0), ("B", 40.0)]),
            10_000.0,
            &ExecutionConfig::default(),
        );
        assert_eq!(exec.trades.len(), 2);
        assert!((exec.trades[0].value + 10_000.0).abs() < 1e-9);
        assert!((exec.trades[0].shares + 500.0).abs() < 1e-9);
    }
}
