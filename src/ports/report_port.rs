//! Report output port.

use crate::domain::backtest::{BacktestConfig, BacktestResult};
use crate::domain::error::FactorTraderError;
use crate::domain::optimizer::PortfolioConfig;

/// Settings a run was produced with, echoed alongside its results.
pub struct RunSettings<'a> {
    pub backtest: &'a BacktestConfig,
    pub portfolio: &'a PortfolioConfig,
}

pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        settings: &RunSettings<'_>,
        output_path: &str,
    ) -> Result<(), FactorTraderError>;
}
