//! Performance metrics over a finished value series.

use super::covariance::TRADING_DAYS_PER_YEAR;
use super::portfolio::ValuePoint;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// A return attributed to the date it was realised on.
pub type DatedReturn = (NaiveDate, f64);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    pub information_ratio: f64,
    pub beta: f64,
    pub alpha: f64,
    pub n_trades: usize,
    pub avg_n_positions: f64,
    pub n_rebalances: usize,
}

impl Metrics {
    /// Statistics of `values`, optionally against a benchmark.
    ///
    /// Benchmark returns are matched to portfolio returns by date; with no
    /// overlap the benchmark is ignored (`beta = 1`, `alpha = 0`,
    /// `information_ratio = 0`).
    pub fn compute(
        values: &[ValuePoint],
        benchmark: Option<&[DatedReturn]>,
        risk_free_rate: f64,
        n_trades: usize,
        n_rebalances: usize,
    ) -> Self {
        let (Some(first), Some(last)) = (values.first(), values.last()) else {
            return Metrics {
                beta: 1.0,
                n_trades,
                n_rebalances,
                ..Metrics::default()
            };
        };

        let returns = daily_returns(values);
        let r: Vec<f64> = returns.iter().map(|(_, x)| *x).collect();

        let total_return = if first.value > 0.0 {
            last.value / first.value - 1.0
        } else {
            0.0
        };
        let years = r.len() as f64 / TRADING_DAYS_PER_YEAR;
        let cagr = if years > 0.0 {
            (1.0 + total_return).max(0.0).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let std = sample_std(&r).unwrap_or(0.0);
        let volatility = std * TRADING_DAYS_PER_YEAR.sqrt();

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let excess_mean = mean(&r).map(|m| m - daily_rf).unwrap_or(0.0);
        let sharpe_ratio = if std > 0.0 {
            TRADING_DAYS_PER_YEAR.sqrt() * excess_mean / std
        } else {
            0.0
        };

        let downside: Vec<f64> = r.iter().copied().filter(|x| *x < 0.0).collect();
        let sortino_ratio = match sample_std(&downside) {
            Some(d) if d > 0.0 => TRADING_DAYS_PER_YEAR.sqrt() * excess_mean / d,
            _ => 0.0,
        };

        let max_drawdown = max_drawdown(&r);
        let calmar_ratio = if max_drawdown != 0.0 {
            cagr / max_drawdown.abs()
        } else {
            0.0
        };

        let win_rate = if r.is_empty() {
            0.0
        } else {
            r.iter().filter(|x| **x > 0.0).count() as f64 / r.len() as f64
        };

        let (beta, alpha, information_ratio) = benchmark
            .map(|b| relative_stats(&returns, b, cagr, risk_free_rate))
            .unwrap_or((1.0, 0.0, 0.0));

        let avg_n_positions =
            values.iter().map(|v| v.weights.len() as f64).sum::<f64>() / values.len() as f64;

        Metrics {
            total_return,
            cagr,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            calmar_ratio,
            win_rate,
            information_ratio,
            beta,
            alpha,
            n_trades,
            avg_n_positions,
            n_rebalances,
        }
    }
}

/// Percentage change between consecutive points; the first point has none.
pub fn daily_returns(values: &[ValuePoint]) -> Vec<DatedReturn> {
    values
        .windows(2)
        .map(|w| (w[1].date, w[1].value / w[0].value - 1.0))
        .filter(|(_, r)| r.is_finite())
        .collect()
}

/// Most negative `cumulative / running_max - 1` over the compounded returns.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        worst = worst.min(cumulative / peak - 1.0);
    }
    worst
}

fn relative_stats(
    returns: &[DatedReturn],
    benchmark: &[DatedReturn],
    cagr: f64,
    risk_free_rate: f64,
) -> (f64, f64, f64) {
    let by_date: HashMap<NaiveDate, f64> = benchmark.iter().copied().collect();
    let (rp, rb): (Vec<f64>, Vec<f64>) = returns
        .iter()
        .filter_map(|(d, r)| by_date.get(d).map(|b| (*r, *b)))
        .unzip();
    if rp.is_empty() {
        return (1.0, 0.0, 0.0);
    }

    let active: Vec<f64> = rp.iter().zip(&rb).map(|(p, b)| p - b).collect();
    let tracking_error = sample_std(&active).unwrap_or(0.0) * TRADING_DAYS_PER_YEAR.sqrt();
    let information_ratio = if tracking_error > 0.0 {
        mean(&active).unwrap_or(0.0) * TRADING_DAYS_PER_YEAR / tracking_error
    } else {
        0.0
    };

    let beta = match (sample_cov(&rp, &rb), sample_cov(&rb, &rb)) {
        (Some(cov), Some(var)) if var > 0.0 => cov / var,
        _ => 1.0,
    };
    let benchmark_annual = mean(&rb).unwrap_or(0.0) * TRADING_DAYS_PER_YEAR;
    let alpha = cagr - (risk_free_rate + beta * (benchmark_annual - risk_free_rate));

    (beta, alpha, information_ratio)
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// `n - 1` denominator; `None` below two observations.
fn sample_cov(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let s: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Some(s / (xs.len() - 1) as f64)
}

fn sample_std(xs: &[f64]) -> Option<f64> {
    sample_cov(xs, xs).map(|v| v.max(0.0).sqrt())
}
