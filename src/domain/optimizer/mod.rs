//! Portfolio construction: target weights from expected returns and a
//! covariance matrix.
//!
//! Every path ends in [`PortfolioOptimizer::apply_constraints`]. Whenever
//! equal weight is used in place of the configured method, the reason is
//! reported as a [`Fallback`] on the outcome.

pub mod hrp;
pub mod solver;

use crate::domain::covariance::CovarianceMatrix;
use crate::domain::error::FactorTraderError;
use crate::domain::weights::Weights;
use log::{info, warn};
use ndarray::Array1;
use serde::Serialize;
use solver::{Problem, SmoothFunction, SolverSettings};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sector assigned to tickers missing from the sector map.
pub const UNKNOWN_SECTOR: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationMethod {
    EqualWeight,
    RiskParity,
    MeanVariance,
    HierarchicalRiskParity,
    /// Kept as given so the optimiser can report it when falling back.
    Unrecognized(String),
}

impl OptimizationMethod {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "equal_weight" => OptimizationMethod::EqualWeight,
            "risk_parity" => OptimizationMethod::RiskParity,
            "mean_variance" => OptimizationMethod::MeanVariance,
            "hierarchical_risk_parity" | "hrp" => OptimizationMethod::HierarchicalRiskParity,
            _ => OptimizationMethod::Unrecognized(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OptimizationMethod::EqualWeight => "equal_weight",
            OptimizationMethod::RiskParity => "risk_parity",
            OptimizationMethod::MeanVariance => "mean_variance",
            OptimizationMethod::HierarchicalRiskParity => "hierarchical_risk_parity",
            OptimizationMethod::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub method: OptimizationMethod,
    /// Annualised volatility cap for mean-variance. `0` disables it.
    pub target_volatility: f64,
    pub max_sector_weight: f64,
    pub max_turnover: f64,
    pub max_position_size: f64,
    pub min_position_size: f64,
    pub risk_free_rate: f64,
    pub solver: SolverSettings,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        PortfolioConfig {
            method: OptimizationMethod::EqualWeight,
            target_volatility: 0.15,
            max_sector_weight: 0.30,
            max_turnover: 0.50,
            max_position_size: 0.10,
            min_position_size: 0.02,
            risk_free_rate: 0.04,
            solver: SolverSettings::default(),
        }
    }
}

/// Why equal weight was used instead of the configured method's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fallback {
    UnknownMethod { method: String },
    SolverFailure { method: String, reason: String },
    /// Every weight fell below the minimum position size.
    DegenerateWeights,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::UnknownMethod { method } => {
                write!(f, "unknown optimization method '{method}'")
            }
            Fallback::SolverFailure { method, reason } => {
                write!(f, "{method} solver failed: {reason}")
            }
            Fallback::DegenerateWeights => f.write_str("all weights below minimum position size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub weights: Weights,
    /// In the order they fired. Empty when the configured method was used as is.
    pub fallbacks: Vec<Fallback>,
}

impl OptimizationOutcome {
    pub fn used_fallback(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioDiagnostics {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub risk_contributions: BTreeMap<String, f64>,
    pub effective_n_assets: f64,
    pub max_weight: f64,
    pub n_positions: usize,
}

#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    config: PortfolioConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: PortfolioConfig) -> Self {
        PortfolioOptimizer { config }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Target weights over `covariance.tickers()`.
    ///
    /// `expected_returns` is aligned with the covariance tickers.
    /// `current` seeds the numerical solvers when it covers the universe.
    /// Solver failures and unknown methods are not errors: they produce
    /// equal weight plus a [`Fallback`]. Only malformed input is an error.
    pub fn optimize(
        &self,
        expected_returns: &[f64],
        covariance: &CovarianceMatrix,
        current: &Weights,
    ) -> Result<OptimizationOutcome, FactorTraderError> {
        let tickers = covariance.tickers();
        if expected_returns.len() != tickers.len() {
            return Err(FactorTraderError::invalid_input(format!(
                "{} expected returns for {} tickers",
                expected_returns.len(),
                tickers.len()
            )));
        }
        if expected_returns.iter().any(|r| !r.is_finite()) {
            return Err(FactorTraderError::invalid_input(
                "expected returns contain non-finite values",
            ));
        }

        let mut fallbacks = Vec::new();
        let raw = match &self.config.method {
            OptimizationMethod::EqualWeight => Weights::equal(tickers),
            OptimizationMethod::HierarchicalRiskParity => {
                zip_weights(tickers, &hrp::hrp_weights(covariance))
            }
            OptimizationMethod::RiskParity | OptimizationMethod::MeanVariance => {
                match self.solve(expected_returns, covariance, current) {
                    Ok(w) => zip_weights(tickers, &w),
                    Err(err) => {
                        warn!(
                            "{} optimization failed ({err}), using equal weight",
                            self.config.method
                        );
                        fallbacks.push(Fallback::SolverFailure {
                            method: self.config.method.name().to_string(),
                            reason: err.to_string(),
                        });
                        Weights::equal(tickers)
                    }
                }
            }
            OptimizationMethod::Unrecognized(name) => {
                warn!("unknown optimization method '{name}', using equal weight");
                fallbacks.push(Fallback::UnknownMethod {
                    method: name.clone(),
                });
                Weights::equal(tickers)
            }
        };

        let mut outcome = self.apply_constraints(&raw);
        fallbacks.append(&mut outcome.fallbacks);
        outcome.fallbacks = fallbacks;
        Ok(outcome)
    }

    fn solve(
        &self,
        expected_returns: &[f64],
        covariance: &CovarianceMatrix,
        current: &Weights,
    ) -> Result<Array1<f64>, solver::SolverError> {
        let tickers = covariance.tickers();
        let x0 = warm_start(tickers, current);
        let expected = Array1::from(expected_returns.to_vec());

        let solution = match self.config.method {
            OptimizationMethod::RiskParity => {
                let objective = RiskParityObjective {
                    cov: covariance,
                    target: 1.0 / tickers.len() as f64,
                };
                let problem = Problem {
                    objective: &objective,
                    inequalities: Vec::new(),
                    upper_bound: self.config.max_position_size,
                };
                solver::minimize(&problem, &x0, &self.config.solver)?
            }
            _ => {
                let objective = PortfolioVariance { cov: covariance };
                let min_return = MinimumReturn {
                    target: expected.mean().unwrap_or(0.0),
                    expected: &expected,
                };
                let max_variance = MaximumVariance {
                    cov: covariance,
                    limit: self.config.target_volatility.powi(2),
                };
                let mut inequalities: Vec<&dyn SmoothFunction> = vec![&min_return];
                if self.config.target_volatility > 0.0 {
                    inequalities.push(&max_variance);
                }
                let problem = Problem {
                    objective: &objective,
                    inequalities,
                    upper_bound: self.config.max_position_size,
                };
                solver::minimize(&problem, &x0, &self.config.solver)?
            }
        };
        Ok(solution.weights)
    }

    /// Clip at the maximum position size, zero anything under the minimum,
    /// renormalise. If nothing survives, equal weight over the input tickers.
    pub fn apply_constraints(&self, weights: &Weights) -> OptimizationOutcome {
        let mut constrained: Weights = weights
            .iter()
            .map(|(t, w)| {
                let w = w.min(self.config.max_position_size);
                let w = if w < self.config.min_position_size { 0.0 } else { w };
                (t.to_string(), w)
            })
            .collect();
        constrained.retain_positive();

        if constrained.normalize() {
            OptimizationOutcome {
                weights: constrained,
                fallbacks: Vec::new(),
            }
        } else {
            warn!(
                "all {} weights below minimum position size {}, using equal weight",
                weights.len(),
                self.config.min_position_size
            );
            let tickers: Vec<&str> = weights.tickers().collect();
            OptimizationOutcome {
                weights: Weights::equal(&tickers),
                fallbacks: vec![Fallback::DegenerateWeights],
            }
        }
    }

    /// Scale every sector above `max_sector_weight` down to the cap, then
    /// renormalise. Tickers without a mapping are pooled into the
    /// [`UNKNOWN_SECTOR`] bucket and capped like any mapped sector, so an
    /// incomplete sector map cannot hide concentration.
    pub fn apply_sector_constraints(
        &self,
        weights: &Weights,
        sectors: &HashMap<String, String>,
    ) -> Weights {
        if sectors.is_empty() || weights.is_empty() {
            return weights.clone();
        }
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for (t, w) in weights.iter() {
            *totals.entry(sector_of(sectors, t)).or_insert(0.0) += w;
        }

        let cap = self.config.max_sector_weight;
        let scale: HashMap<&str, f64> = totals
            .iter()
            .filter(|(_, total)| **total > cap)
            .map(|(sector, total)| (*sector, cap / total))
            .collect();
        if scale.is_empty() {
            return weights.clone();
        }
        for (sector, factor) in &scale {
            info!("sector {sector} over {:.1}% cap, scaling by {factor:.3}", cap * 100.0);
        }

        let mut adjusted: Weights = weights
            .iter()
            .map(|(t, w)| {
                let factor = scale.get(sector_of(sectors, t)).copied().unwrap_or(1.0);
                (t.to_string(), w * factor)
            })
            .collect();
        if adjusted.normalize() {
            adjusted
        } else {
            weights.clone()
        }
    }

    /// Ex-ante statistics of `weights` over the covariance tickers.
    pub fn portfolio_diagnostics(
        &self,
        weights: &Weights,
        expected_returns: &[f64],
        covariance: &CovarianceMatrix,
    ) -> PortfolioDiagnostics {
        let tickers = covariance.tickers();
        let w: Array1<f64> = tickers.iter().map(|t| weights.get(t)).collect();
        let expected_return: f64 = w.iter().zip(expected_returns).map(|(a, b)| a * b).sum();

        let marginal = covariance.mul_vec(&w);
        let variance = w.dot(&marginal);
        let volatility = variance.max(0.0).sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (expected_return - self.config.risk_free_rate) / volatility
        } else {
            0.0
        };

        let risk_contributions = tickers
            .iter()
            .zip(w.iter().zip(&marginal))
            .map(|(t, (wi, mi))| {
                let rc = if volatility > 0.0 { wi * mi / volatility } else { 0.0 };
                (t.clone(), rc)
            })
            .collect();

        let sum_sq = w.dot(&w);
        PortfolioDiagnostics {
            expected_return,
            volatility,
            sharpe_ratio,
            risk_contributions,
            effective_n_assets: if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 },
            max_weight: weights.max_weight(),
            n_positions: weights.position_count(),
        }
    }
}

fn sector_of<'a>(sectors: &'a HashMap<String, String>, ticker: &str) -> &'a str {
    sectors
        .get(ticker)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_SECTOR)
}

fn zip_weights(tickers: &[String], values: &Array1<f64>) -> Weights {
    tickers.iter().cloned().zip(values.iter().copied()).collect()
}

/// Current weights when they cover every ticker with a positive total,
/// otherwise `1/N`. The solver projects this onto the feasible set.
fn warm_start(tickers: &[String], current: &Weights) -> Array1<f64> {
    let n = tickers.len();
    let seeded: Array1<f64> = tickers.iter().map(|t| current.get(t)).collect();
    let covered = tickers.iter().all(|t| current.contains(t));
    if covered && seeded.sum() > 0.0 {
        seeded
    } else {
        Array1::from_elem(n, 1.0 / n as f64)
    }
}

/// `Σ_i (w_i (Σw)_i / σ - 1/N)²` with `σ = sqrt(wᵀΣw)`.
struct RiskParityObjective<'a> {
    cov: &'a CovarianceMatrix,
    target: f64,
}

impl RiskParityObjective<'_> {
    /// `Σw`, `σ` and the per-asset residuals `w_i (Σw)_i / σ - 1/N`.
    fn residuals(&self, w: &Array1<f64>) -> (Array1<f64>, f64, Array1<f64>) {
        let m = self.cov.mul_vec(w);
        let sigma = w.dot(&m).max(f64::MIN_POSITIVE).sqrt();
        let residual = (w * &m) / sigma - self.target;
        (m, sigma, residual)
    }
}

impl SmoothFunction for RiskParityObjective<'_> {
    fn value(&self, w: &Array1<f64>) -> f64 {
        let (_, _, residual) = self.residuals(w);
        residual.dot(&residual)
    }

    fn gradient(&self, w: &Array1<f64>) -> Array1<f64> {
        // ∂c_i/∂w_j = (δ_ij m_i + w_i Σ_ij) / σ - w_i m_i m_j / σ³, so with
        // symmetric Σ the chain rule collapses to matrix-vector products.
        let (m, sigma, residual) = self.residuals(w);
        let direct = &residual * &m + self.cov.mul_vec(&(&residual * w));
        let through_sigma = residual.dot(&(w * &m)) / sigma.powi(3);
        (direct / sigma - &m * through_sigma) * 2.0
    }
}

/// `wᵀΣw`
struct PortfolioVariance<'a> {
    cov: &'a CovarianceMatrix,
}

impl SmoothFunction for PortfolioVariance<'_> {
    fn value(&self, w: &Array1<f64>) -> f64 {
        self.cov.quad_form(w)
    }

    fn gradient(&self, w: &Array1<f64>) -> Array1<f64> {
        self.cov.mul_vec(w) * 2.0
    }
}

/// `μ·w - target >= 0`
struct MinimumReturn<'a> {
    expected: &'a Array1<f64>,
    target: f64,
}

impl SmoothFunction for MinimumReturn<'_> {
    fn value(&self, w: &Array1<f64>) -> f64 {
        self.expected.dot(w) - self.target
    }

    fn gradient(&self, _w: &Array1<f64>) -> Array1<f64> {
        self.expected.clone()
    }
}

/// `limit - wᵀΣw >= 0`
struct MaximumVariance<'a> {
    cov: &'a CovarianceMatrix,
    limit: f64,
}

impl SmoothFunction for MaximumVariance<'_> {
    fn value(&self, w: &Array1<f64>) -> f64 {
        self.limit - self.cov.quad_form(w)
    }

    fn gradient(&self, w: &Array1<f64>) -> Array1<f64> {
        self.cov.mul_vec(w) * -2.0
    }
}
