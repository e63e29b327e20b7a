//! Constrained minimiser for long-only, fully-invested weight vectors.
//!
//! Feasible set: `Σw = 1`, `0 <= w_i <= upper_bound`, plus any number of
//! smooth inequality constraints `g(w) >= 0`.
//!
//! The box/budget part is enforced exactly by Euclidean projection onto the
//! capped simplex. Inequalities are folded into an augmented Lagrangian and
//! the subproblems are solved with projected gradient descent and Armijo
//! backtracking. Every solve is bounded by an iteration budget and an
//! optional wall-clock limit; exhausting either is an error, never a
//! silently truncated answer.

use ndarray::{Array1, Zip};
use std::time::{Duration, Instant};

const PROJECTION_BISECTIONS: usize = 80;
const MAX_OUTER_ITERATIONS: usize = 25;
const FEASIBILITY_TOLERANCE: f64 = 1e-7;
const MIN_STEP: f64 = 1e-18;
const MAX_STEP: f64 = 1e6;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    /// Total projected-gradient iterations across all outer rounds.
    pub max_iterations: usize,
    /// Stationarity threshold on `‖w - P(w - ∇f)‖∞`, also applied to the
    /// largest single-step weight change.
    pub tolerance: f64,
    pub time_limit: Option<Duration>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 10_000,
            tolerance: 1e-6,
            time_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("infeasible: {reason}")]
    Infeasible { reason: String },

    #[error("did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("time limit of {limit:?} exceeded")]
    TimedOut { limit: Duration },

    #[error("numerical failure: {reason}")]
    Numerical { reason: String },
}

/// Smooth function of the weight vector with an analytic gradient.
pub trait SmoothFunction {
    fn value(&self, w: &Array1<f64>) -> f64;
    fn gradient(&self, w: &Array1<f64>) -> Array1<f64>;
}

/// Minimisation problem over the capped simplex.
pub struct Problem<'a> {
    pub objective: &'a dyn SmoothFunction,
    /// Each entry must satisfy `g(w) >= 0` at the solution.
    pub inequalities: Vec<&'a dyn SmoothFunction>,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub weights: Array1<f64>,
    pub objective: f64,
    pub iterations: usize,
}

/// Minimise `problem` starting from `x0` (projected onto the feasible set).
pub fn minimize(
    problem: &Problem<'_>,
    x0: &Array1<f64>,
    settings: &SolverSettings,
) -> Result<Solution, SolverError> {
    let n = x0.len();
    if n == 0 {
        return Err(SolverError::Infeasible {
            reason: "empty universe".into(),
        });
    }
    let upper = problem.upper_bound;
    if !(upper > 0.0) || (n as f64) * upper < 1.0 - 1e-12 {
        return Err(SolverError::Infeasible {
            reason: format!("{n} assets with upper bound {upper} cannot sum to 1"),
        });
    }

    let started = Instant::now();
    let mut w = project_capped_simplex(x0, upper);
    let mut multipliers = vec![0.0; problem.inequalities.len()];
    let mut penalty = 10.0;
    let mut iterations = 0usize;
    let mut prev_violation = f64::INFINITY;

    for _ in 0..MAX_OUTER_ITERATIONS {
        let lagrangian = AugmentedLagrangian {
            problem,
            multipliers: &multipliers,
            penalty,
        };
        w = projected_gradient(&lagrangian, w, upper, settings, started, &mut iterations)?;

        if problem.inequalities.is_empty() {
            break;
        }

        let values: Vec<f64> = problem.inequalities.iter().map(|g| g.value(&w)).collect();
        let violation = values.iter().map(|g| (-g).max(0.0)).fold(0.0, f64::max);

        let mut multiplier_shift = 0.0_f64;
        for (lambda, g) in multipliers.iter_mut().zip(&values) {
            let updated = (*lambda - penalty * g).max(0.0);
            multiplier_shift = multiplier_shift.max((updated - *lambda).abs());
            *lambda = updated;
        }

        if violation <= FEASIBILITY_TOLERANCE && multiplier_shift <= settings.tolerance.max(1e-10) {
            break;
        }
        if violation > 0.25 * prev_violation {
            penalty *= 10.0;
        }
        prev_violation = violation;
    }

    let violation = problem
        .inequalities
        .iter()
        .map(|g| (-g.value(&w)).max(0.0))
        .fold(0.0, f64::max);
    if violation > FEASIBILITY_TOLERANCE {
        return Err(SolverError::Infeasible {
            reason: format!("inequality constraint violated by {violation:.3e}"),
        });
    }

    let objective = problem.objective.value(&w);
    if !objective.is_finite() {
        return Err(SolverError::Numerical {
            reason: "objective is not finite at the solution".into(),
        });
    }

    Ok(Solution {
        weights: w,
        objective,
        iterations,
    })
}

struct AugmentedLagrangian<'a, 'p> {
    problem: &'a Problem<'p>,
    multipliers: &'a [f64],
    penalty: f64,
}

impl SmoothFunction for AugmentedLagrangian<'_, '_> {
    fn value(&self, w: &Array1<f64>) -> f64 {
        let mut total = self.problem.objective.value(w);
        for (g, &lambda) in self.problem.inequalities.iter().zip(self.multipliers) {
            let shifted = (lambda - self.penalty * g.value(w)).max(0.0);
            total += (shifted * shifted - lambda * lambda) / (2.0 * self.penalty);
        }
        total
    }

    fn gradient(&self, w: &Array1<f64>) -> Array1<f64> {
        let mut grad = self.problem.objective.gradient(w);
        for (g, &lambda) in self.problem.inequalities.iter().zip(self.multipliers) {
            let shifted = (lambda - self.penalty * g.value(w)).max(0.0);
            if shifted > 0.0 {
                grad.scaled_add(-shifted, &g.gradient(w));
            }
        }
        grad
    }
}

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    Zip::from(a)
        .and(b)
        .fold(0.0, |acc, x, y| f64::max(acc, (x - y).abs()))
}

fn projected_gradient(
    f: &dyn SmoothFunction,
    mut w: Array1<f64>,
    upper: f64,
    settings: &SolverSettings,
    started: Instant,
    iterations: &mut usize,
) -> Result<Array1<f64>, SolverError> {
    let mut value = f.value(&w);
    if !value.is_finite() {
        return Err(SolverError::Numerical {
            reason: "objective is not finite at the starting point".into(),
        });
    }
    let mut step = 1.0;

    loop {
        if *iterations >= settings.max_iterations {
            return Err(SolverError::NotConverged {
                iterations: *iterations,
            });
        }
        if let Some(limit) = settings.time_limit {
            if started.elapsed() > limit {
                return Err(SolverError::TimedOut { limit });
            }
        }
        *iterations += 1;

        let grad = f.gradient(&w);
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(SolverError::Numerical {
                reason: "gradient is not finite".into(),
            });
        }

        // Projected-gradient residual at unit step: zero exactly at a
        // stationary point of f over the capped simplex.
        let residual = max_abs_diff(&w, &project_capped_simplex(&(&w - &grad), upper));
        if residual <= settings.tolerance {
            return Ok(w);
        }

        // Armijo backtracking on the projection arc.
        let (candidate, candidate_value) = loop {
            let trial = project_capped_simplex(&(&w - &(&grad * step)), upper);
            let trial_value = f.value(&trial);
            let delta = &trial - &w;
            let predicted = value + grad.dot(&delta) + delta.dot(&delta) / (2.0 * step);
            if trial_value.is_finite() && trial_value <= predicted + 1e-15 * value.abs().max(1.0) {
                break (trial, trial_value);
            }
            step *= 0.5;
            if step < MIN_STEP {
                // No descent direction left along the arc: stationary.
                return Ok(w);
            }
        };

        let moved = max_abs_diff(&candidate, &w);
        w = candidate;
        value = candidate_value;

        if moved <= settings.tolerance {
            return Ok(w);
        }
        step = (step * 2.0).min(MAX_STEP);
    }
}

/// Euclidean projection of `v` onto `{w : Σw = 1, 0 <= w_i <= upper}`.
///
/// Requires `v.len() * upper >= 1`. Finds the shift `τ` with
/// `Σ clamp(v_i - τ, 0, upper) = 1` by bisection.
pub fn project_capped_simplex(v: &Array1<f64>, upper: f64) -> Array1<f64> {
    let clamp_sum = |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(0.0, upper)).sum() };

    let max_v = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_v = v.iter().copied().fold(f64::INFINITY, f64::min);
    // Sum is n*upper (>= 1) at `lo` and 0 at `hi`.
    let mut lo = min_v - upper;
    let mut hi = max_v;
    for _ in 0..PROJECTION_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        if clamp_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let tau = 0.5 * (lo + hi);
    v.mapv(|x| (x - tau).clamp(0.0, upper))
}
