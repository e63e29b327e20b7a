//! Turnover budget between consecutive rebalances.

use crate::domain::weights::{Weights, turnover};
use log::info;

/// Blend `new` toward `current` so realised turnover stays within
/// `max_turnover`.
///
/// An empty `current` (first rebalance) or a move already within budget
/// passes `new` through unchanged. Otherwise every ticker moves from its old
/// weight toward its new one by `max_turnover / turnover` of the distance,
/// so each intended trade keeps its direction. Non-positive results are
/// dropped and the rest renormalised.
pub fn apply_turnover_constraint(new: &Weights, current: &Weights, max_turnover: f64) -> Weights {
    if current.is_empty() {
        return new.clone();
    }
    let proposed = turnover(new, current);
    if proposed <= max_turnover {
        return new.clone();
    }

    info!(
        "turnover {:.1}% exceeds limit {:.1}%, scaling back",
        proposed * 100.0,
        max_turnover * 100.0
    );
    let blend = max_turnover / proposed;

    let mut blended: Weights = new
        .union_tickers(current)
        .into_iter()
        .map(|t| {
            let old = current.get(t);
            let target = new.get(t);
            (t.to_string(), old + blend * (target - old))
        })
        .collect();
    blended.retain_positive();
    if blended.normalize() {
        blended
    } else {
        new.clone()
    }
}
