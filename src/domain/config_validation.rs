//! Configuration validation.
//!
//! Runs against the raw config before any component is built. An unknown
//! `optimization_method` is deliberately accepted here: the optimiser falls
//! back to equal weight and reports it.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::FactorTraderError;
use crate::domain::optimizer::PortfolioConfig;
use crate::domain::rebalance::RebalanceFrequency;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let defaults = BacktestConfig::default();

    let capital = config.get_double("backtest", "initial_capital", defaults.initial_capital);
    if capital <= 0.0 {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }

    let cost = config.get_double(
        "backtest",
        "transaction_cost",
        defaults.execution.transaction_cost,
    );
    validate_fraction("backtest", "transaction_cost", cost)?;
    let slippage = config.get_double("backtest", "slippage", defaults.execution.slippage);
    validate_fraction("backtest", "slippage", slippage)?;

    let rf = config.get_double("backtest", "risk_free_rate", defaults.risk_free_rate);
    validate_fraction("backtest", "risk_free_rate", rf)?;

    if let Some(freq) = config.get_string("backtest", "rebalance_frequency") {
        freq.parse::<RebalanceFrequency>()
            .map_err(|reason| invalid("backtest", "rebalance_frequency", &reason))?;
    }

    let start = parse_date(config, "backtest", "start_date")?;
    let end = parse_date(config, "backtest", "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
        }
    }

    let max_holdings = config.get_int("backtest", "max_holdings", defaults.max_holdings as i64);
    if max_holdings < 1 {
        return Err(invalid("backtest", "max_holdings", "max_holdings must be at least 1"));
    }

    let lookback = config.get_int("backtest", "lookback_days", defaults.lookback_days as i64);
    if lookback < 2 {
        return Err(invalid("backtest", "lookback_days", "lookback_days must be at least 2"));
    }
    let min_history =
        config.get_int("backtest", "min_history_days", defaults.min_history_days as i64);
    if min_history < 1 || min_history > lookback {
        return Err(invalid(
            "backtest",
            "min_history_days",
            "min_history_days must be between 1 and lookback_days",
        ));
    }

    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let defaults = PortfolioConfig::default();

    let max_pos = config.get_double("portfolio", "max_position_size", defaults.max_position_size);
    if max_pos <= 0.0 || max_pos > 1.0 {
        return Err(invalid(
            "portfolio",
            "max_position_size",
            "max_position_size must be between 0 and 1",
        ));
    }

    let min_pos = config.get_double("portfolio", "min_position_size", defaults.min_position_size);
    if min_pos < 0.0 {
        return Err(invalid(
            "portfolio",
            "min_position_size",
            "min_position_size must be non-negative",
        ));
    }
    if min_pos > max_pos {
        return Err(invalid(
            "portfolio",
            "min_position_size",
            "min_position_size must not exceed max_position_size",
        ));
    }

    let turnover = config.get_double("portfolio", "max_turnover", defaults.max_turnover);
    if turnover <= 0.0 {
        return Err(invalid("portfolio", "max_turnover", "max_turnover must be positive"));
    }

    let sector = config.get_double("portfolio", "max_sector_weight", defaults.max_sector_weight);
    if sector <= 0.0 || sector > 1.0 {
        return Err(invalid(
            "portfolio",
            "max_sector_weight",
            "max_sector_weight must be between 0 and 1",
        ));
    }

    let vol = config.get_double("portfolio", "target_volatility", defaults.target_volatility);
    if vol < 0.0 {
        return Err(invalid(
            "portfolio",
            "target_volatility",
            "target_volatility must be non-negative",
        ));
    }

    if config.get_string("portfolio", "risk_free_rate").is_some() {
        let rf = config.get_double("portfolio", "risk_free_rate", defaults.risk_free_rate);
        validate_fraction("portfolio", "risk_free_rate", rf)?;
    }

    let iterations = config.get_int(
        "portfolio",
        "max_iterations",
        defaults.solver.max_iterations as i64,
    );
    if iterations < 1 {
        return Err(invalid("portfolio", "max_iterations", "max_iterations must be at least 1"));
    }
    let tolerance = config.get_double("portfolio", "tolerance", defaults.solver.tolerance);
    if tolerance <= 0.0 {
        return Err(invalid("portfolio", "tolerance", "tolerance must be positive"));
    }

    Ok(())
}

/// Optional `YYYY-MM-DD` value. Blank counts as absent.
pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, FactorTraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    section,
                    key,
                    &format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn validate_fraction(section: &str, key: &str, value: f64) -> Result<(), FactorTraderError> {
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(section, key, &format!("{key} must be between 0 and 1")));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> FactorTraderError {
    FactorTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
