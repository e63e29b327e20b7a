//! JSON report adapter implementing ReportPort.
//!
//! Writes one document holding the run settings, metrics and full history.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::backtest::{BacktestResult, FallbackRecord, SkippedRebalance};
use crate::domain::error::FactorTraderError;
use crate::domain::execution::Trade;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::{RebalanceRecord, ValuePoint};
use crate::ports::report_port::{ReportPort, RunSettings};

#[derive(Serialize)]
struct SettingsView<'a> {
    initial_capital: f64,
    rebalance_frequency: String,
    transaction_cost: f64,
    slippage: f64,
    benchmark: Option<&'a str>,
    risk_free_rate: f64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    max_holdings: usize,
    lookback_days: usize,
    min_history_days: usize,
    optimization_method: &'a str,
    target_volatility: f64,
    max_sector_weight: f64,
    max_turnover: f64,
    max_position_size: f64,
    min_position_size: f64,
}

impl<'a> SettingsView<'a> {
    fn new(settings: &'a RunSettings<'a>) -> Self {
        let bt = settings.backtest;
        let pf = settings.portfolio;
        SettingsView {
            initial_capital: bt.initial_capital,
            rebalance_frequency: bt.rebalance_frequency.to_string(),
            transaction_cost: bt.execution.transaction_cost,
            slippage: bt.execution.slippage,
            benchmark: bt.benchmark.as_deref(),
            risk_free_rate: bt.risk_free_rate,
            start_date: bt.start_date,
            end_date: bt.end_date,
            max_holdings: bt.max_holdings,
            lookback_days: bt.lookback_days,
            min_history_days: bt.min_history_days,
            optimization_method: pf.method.name(),
            target_volatility: pf.target_volatility,
            max_sector_weight: pf.max_sector_weight,
            max_turnover: pf.max_turnover,
            max_position_size: pf.max_position_size,
            min_position_size: pf.min_position_size,
        }
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    settings: SettingsView<'a>,
    final_value: Option<f64>,
    metrics: &'a Metrics,
    values: &'a [ValuePoint],
    weights_history: &'a [RebalanceRecord],
    transactions: &'a [Trade],
    skipped_rebalances: &'a [SkippedRebalance],
    fallbacks: &'a [FallbackRecord],
}

#[derive(Default)]
pub struct JsonReportAdapter {
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        settings: &RunSettings<'_>,
        output_path: &str,
    ) -> Result<(), FactorTraderError> {
        let document = ReportDocument {
            settings: SettingsView::new(settings),
            final_value: result.final_value(),
            metrics: &result.metrics,
            values: &result.values,
            weights_history: &result.weights_history,
            transactions: &result.transactions,
            skipped_rebalances: &result.skipped_rebalances,
            fallbacks: &result.fallbacks,
        };

        let json = if self.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };

        let path = Path::new(output_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        log::info!("wrote report to {}", path.display());
        Ok(())
    }
}
