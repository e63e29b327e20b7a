//! Core domain types and logic.

pub mod weights;
pub mod price_table;
pub mod score_table;
pub mod covariance;
pub mod optimizer;
pub mod turnover;
pub mod execution;
pub mod rebalance;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
