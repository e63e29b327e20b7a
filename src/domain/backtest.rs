//! Walk-forward backtest loop.
//!
//! On each date, in order:
//! 1. snapshot `(date, value, weights)` before anything else happens;
//! 2. on a scheduled date, pick the top-scored tickers, estimate a trailing
//!    covariance, optimise, cap sector and turnover exposure, execute trades
//!    and deduct their cost;
//! 3. accrue the P&L of holding the current weights into the next date.
//!
//! The final date is only snapshotted.

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::covariance::{CovarianceMatrix, TRADING_DAYS_PER_YEAR};
use super::error::FactorTraderError;
use super::execution::{ExecutionConfig, Trade, execute};
use super::metrics::{DatedReturn, Metrics};
use super::optimizer::{Fallback, OptimizationOutcome, PortfolioOptimizer};
use super::portfolio::{PortfolioState, RebalanceRecord, ValuePoint};
use super::price_table::PriceTable;
use super::rebalance::{RebalanceFrequency, rebalance_schedule};
use super::score_table::CompositeScores;
use super::turnover::apply_turnover_constraint;
use super::weights::Weights;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub rebalance_frequency: RebalanceFrequency,
    pub execution: ExecutionConfig,
    /// Price column used as benchmark. `None` disables benchmark statistics.
    pub benchmark: Option<String>,
    pub risk_free_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_holdings: usize,
    /// Trailing price rows (inclusive of the rebalance date) used for covariance.
    pub lookback_days: usize,
    /// Fewer complete return rows than this skips the rebalance.
    pub min_history_days: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 1_000_000.0,
            rebalance_frequency: RebalanceFrequency::Monthly,
            execution: ExecutionConfig::default(),
            benchmark: Some("SPY".to_string()),
            risk_free_rate: 0.04,
            start_date: None,
            end_date: None,
            max_holdings: 30,
            lookback_days: 252,
            min_history_days: 60,
        }
    }
}

/// Why a scheduled rebalance did not happen. Prior weights persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RebalanceSkip {
    /// The score table has no row for the date.
    NoScores,
    /// The row exists but no priced ticker has a usable score.
    NoScoredTickers,
    InsufficientHistory { returns: usize, minimum: usize },
}

impl fmt::Display for RebalanceSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceSkip::NoScores => f.write_str("no scores for date"),
            RebalanceSkip::NoScoredTickers => f.write_str("no scored tickers"),
            RebalanceSkip::InsufficientHistory { returns, minimum } => {
                write!(f, "{returns} days of returns, need {minimum}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRebalance {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub reason: RebalanceSkip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackRecord {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub fallback: Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub values: Vec<ValuePoint>,
    pub weights_history: Vec<RebalanceRecord>,
    pub transactions: Vec<Trade>,
    pub skipped_rebalances: Vec<SkippedRebalance>,
    pub fallbacks: Vec<FallbackRecord>,
    pub metrics: Metrics,
}

impl BacktestResult {
    pub fn final_value(&self) -> Option<f64> {
        self.values.last().map(|v| v.value)
    }
}

enum RebalanceDecision {
    Rebalance(OptimizationOutcome),
    Skip(RebalanceSkip),
}

pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Backtester { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run over `prices` restricted to the configured date range.
    ///
    /// Fails only on unusable input (empty range, malformed covariance
    /// input); everything else is recorded in the result.
    pub fn run(
        &self,
        prices: &PriceTable,
        scores: &CompositeScores,
        optimizer: &PortfolioOptimizer,
        sectors: Option<&HashMap<String, String>>,
    ) -> Result<BacktestResult, FactorTraderError> {
        let prices = prices.slice(self.config.start_date, self.config.end_date)?;
        let scores = scores.slice(self.config.start_date, self.config.end_date);
        let schedule = rebalance_schedule(prices.dates(), self.config.rebalance_frequency);
        let last = prices.len() - 1;

        let mut state = PortfolioState::new(self.config.initial_capital);
        let mut values = Vec::with_capacity(prices.len());
        let mut weights_history = Vec::new();
        let mut transactions = Vec::new();
        let mut skipped_rebalances = Vec::new();
        let mut fallbacks = Vec::new();

        for i in 0..prices.len() {
            let date = prices.date(i);
            values.push(ValuePoint {
                date,
                value: state.value,
                weights: state.weights.clone(),
            });
            if i == last {
                break;
            }

            let today = prices.price_map(i);

            if schedule[i] {
                match self.decide(i, &prices, &scores, optimizer, sectors, &state.weights)? {
                    RebalanceDecision::Skip(reason) => {
                        debug!("skipping rebalance on {date}: {reason}");
                        skipped_rebalances.push(SkippedRebalance { date, reason });
                    }
                    RebalanceDecision::Rebalance(outcome) => {
                        fallbacks.extend(
                            outcome
                                .fallbacks
                                .into_iter()
                                .map(|fallback| FallbackRecord { date, fallback }),
                        );
                        let target = apply_turnover_constraint(
                            &outcome.weights,
                            &state.weights,
                            optimizer.config().max_turnover,
                        );
                        let execution = execute(
                            date,
                            &state.weights,
                            &target,
                            &today,
                            state.value,
                            &self.config.execution,
                        );
                        state.deduct_cost(execution.total_cost);
                        info!(
                            "rebalanced on {date}: {} positions, costs: ${:.2}",
                            target.len(),
                            execution.total_cost
                        );
                        weights_history.push(RebalanceRecord {
                            date,
                            weights: target.clone(),
                            cost: execution.total_cost,
                        });
                        transactions.extend(execution.trades);
                        state.rebalance_to(target);
                    }
                }
            }

            if !state.weights.is_empty() {
                let tomorrow = prices.price_map(i + 1);
                let pnl = state.daily_pnl(&today, &tomorrow);
                state.accrue(pnl);
            }
        }

        let benchmark = self.benchmark_returns(&prices);
        let metrics = Metrics::compute(
            &values,
            benchmark.as_deref(),
            self.config.risk_free_rate,
            transactions.len(),
            weights_history.len(),
        );

        Ok(BacktestResult {
            values,
            weights_history,
            transactions,
            skipped_rebalances,
            fallbacks,
            metrics,
        })
    }

    fn decide(
        &self,
        index: usize,
        prices: &PriceTable,
        scores: &CompositeScores,
        optimizer: &PortfolioOptimizer,
        sectors: Option<&HashMap<String, String>>,
        current: &Weights,
    ) -> Result<RebalanceDecision, FactorTraderError> {
        let date = prices.date(index);
        let Some(ranked) = scores.top_n(date, usize::MAX) else {
            return Ok(RebalanceDecision::Skip(RebalanceSkip::NoScores));
        };

        let (tickers, expected): (Vec<String>, Vec<f64>) = ranked
            .into_iter()
            .filter(|(t, _)| prices.has_ticker(t))
            .take(self.config.max_holdings)
            .unzip();
        if tickers.is_empty() {
            return Ok(RebalanceDecision::Skip(RebalanceSkip::NoScoredTickers));
        }

        // A sample covariance needs two observations whatever the config says.
        let minimum = self.config.min_history_days.max(2);
        let rows = prices.trailing_returns(index, self.config.lookback_days, &tickers);
        if rows.len() < minimum {
            return Ok(RebalanceDecision::Skip(RebalanceSkip::InsufficientHistory {
                returns: rows.len(),
                minimum,
            }));
        }

        let covariance = CovarianceMatrix::from_returns(tickers, &rows, TRADING_DAYS_PER_YEAR)?;
        let mut outcome = optimizer.optimize(&expected, &covariance, current)?;
        if let Some(sectors) = sectors {
            outcome.weights = optimizer.apply_sector_constraints(&outcome.weights, sectors);
        }
        Ok(RebalanceDecision::Rebalance(outcome))
    }

    fn benchmark_returns(&self, prices: &PriceTable) -> Option<Vec<DatedReturn>> {
        let ticker = self.config.benchmark.as_deref()?;
        if !prices.has_ticker(ticker) {
            warn!("benchmark {ticker} not in price table, skipping benchmark statistics");
            return None;
        }
        Some(
            prices
                .dates()
                .iter()
                .zip(prices.returns(ticker))
                .filter_map(|(d, r)| r.map(|r| (*d, r)))
                .collect(),
        )
    }
}
