//! Annualised covariance matrices over a ticker subset.

use crate::domain::error::FactorTraderError;
use ndarray::{Array1, Array2, ArrayView2, Axis};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    tickers: Vec<String>,
    values: Array2<f64>,
}

impl CovarianceMatrix {
    pub fn new(tickers: Vec<String>, values: Array2<f64>) -> Result<Self, FactorTraderError> {
        let n = tickers.len();
        if n == 0 {
            return Err(FactorTraderError::invalid_input("covariance matrix has no tickers"));
        }
        if values.dim() != (n, n) {
            return Err(FactorTraderError::invalid_input(format!(
                "covariance matrix must be {n}x{n}"
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FactorTraderError::invalid_input(
                "covariance matrix contains non-finite values",
            ));
        }
        Ok(CovarianceMatrix { tickers, values })
    }

    /// Sample covariance (n - 1 denominator) of daily return rows, scaled
    /// by `annualization`. Each row holds one return per ticker.
    pub fn from_returns(
        tickers: Vec<String>,
        rows: &[Vec<f64>],
        annualization: f64,
    ) -> Result<Self, FactorTraderError> {
        let n = tickers.len();
        if rows.len() < 2 {
            return Err(FactorTraderError::invalid_input(format!(
                "need at least 2 return observations, have {}",
                rows.len()
            )));
        }
        if rows.iter().any(|r| r.len() != n) {
            return Err(FactorTraderError::invalid_input(
                "return rows do not match ticker count",
            ));
        }

        let returns = Array2::from_shape_fn((rows.len(), n), |(t, j)| rows[t][j]);
        let means = returns
            .mean_axis(Axis(0))
            .ok_or_else(|| FactorTraderError::invalid_input("no return observations"))?;
        let centered = &returns - &means;
        let obs = rows.len() as f64;
        let values = centered.t().dot(&centered) * (annualization / (obs - 1.0));

        CovarianceMatrix::new(tickers, values)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// `Σw`
    pub fn mul_vec(&self, w: &Array1<f64>) -> Array1<f64> {
        self.values.dot(w)
    }

    /// `wᵀΣw`
    pub fn quad_form(&self, w: &Array1<f64>) -> f64 {
        w.dot(&self.values.dot(w))
    }

    /// Correlation matrix. Tickers with zero variance get zero correlation
    /// with everything else (and 1 on the diagonal).
    pub fn correlation(&self) -> Array2<f64> {
        let std = self.values.diag().mapv(|v| v.max(0.0).sqrt());
        Array2::from_shape_fn(self.values.dim(), |(i, j)| {
            if i == j {
                1.0
            } else if std[i] > 0.0 && std[j] > 0.0 {
                (self.values[[i, j]] / (std[i] * std[j])).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
    }
}
