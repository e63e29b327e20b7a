//! Portfolio state and the series recorded while simulating.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use super::weights::Weights;

/// Value and weights as of one point in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub value: f64,
    pub weights: Weights,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioState {
            value: initial_capital,
            weights: Weights::new(),
        }
    }

    pub fn deduct_cost(&mut self, cost: f64) {
        self.value -= cost;
    }

    /// Replace the held weights after a rebalance.
    pub fn rebalance_to(&mut self, weights: Weights) {
        self.weights = weights;
    }

    /// P&L from holding the current weights from `today` to `tomorrow`.
    ///
    /// Only tickers priced on both days contribute. Weights are held
    /// constant between rebalances; drift is not tracked.
    pub fn daily_pnl(&self, today: &HashMap<String, f64>, tomorrow: &HashMap<String, f64>) -> f64 {
        self.weights
            .iter()
            .filter_map(|(t, w)| {
                let p0 = today.get(t)?;
                let p1 = tomorrow.get(t)?;
                Some(w * self.value * (p1 / p0 - 1.0))
            })
            .sum()
    }

    pub fn accrue(&mut self, pnl: f64) {
        self.value += pnl;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
    pub weights: Weights,
}

/// Weights adopted on a rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceRecord {
    pub date: NaiveDate,
    pub weights: Weights,
    pub cost: f64,
}
