//! Market and factor data port.

use crate::domain::error::FactorTraderError;
use crate::domain::price_table::PriceTable;
use crate::domain::score_table::ScoreTable;
use std::collections::HashMap;

pub trait DataPort {
    fn load_prices(&self) -> Result<PriceTable, FactorTraderError>;

    fn load_scores(&self) -> Result<ScoreTable, FactorTraderError>;

    /// Ticker → sector. Sources without sector data return an empty map.
    fn load_sectors(&self) -> Result<HashMap<String, String>, FactorTraderError> {
        Ok(HashMap::new())
    }
}
