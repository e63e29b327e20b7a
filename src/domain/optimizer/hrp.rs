//! Hierarchical risk parity.
//!
//! 1. Correlation distance `d = sqrt(2 (1 - ρ))`.
//! 2. Single-linkage agglomerative clustering.
//! 3. Quasi-diagonal order: leaves of the merge tree, left subtree first.
//! 4. Recursive bisection of that order, splitting weight between halves
//!    inversely to their inverse-variance cluster variance.

use crate::domain::covariance::CovarianceMatrix;
use ndarray::{Array1, Array2, Axis};

/// Smallest variance used when inverting a diagonal entry.
const VARIANCE_FLOOR: f64 = 1e-12;

/// One agglomeration step. Ids `< n` are leaves; the merge at position
/// `k` creates cluster id `n + k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
}

/// HRP weights in the covariance matrix's ticker order.
pub fn hrp_weights(cov: &CovarianceMatrix) -> Array1<f64> {
    let n = cov.len();
    if n == 1 {
        return Array1::ones(1);
    }
    let dist = correlation_distance(&cov.correlation());
    let merges = single_linkage(&dist);
    let order = quasi_diagonal_order(&merges, n);
    recursive_bisection(cov, &order)
}

pub fn correlation_distance(corr: &Array2<f64>) -> Array2<f64> {
    let mut dist = corr.mapv(|rho| (2.0 * (1.0 - rho)).max(0.0).sqrt());
    dist.diag_mut().fill(0.0);
    dist
}

/// Single-linkage clustering over a symmetric distance matrix.
///
/// Ties resolve to the lowest pair of active cluster ids. The smaller id of
/// each merged pair is reported as `left`.
pub fn single_linkage(dist: &Array2<f64>) -> Vec<Merge> {
    let n = dist.nrows();
    // (cluster id, member leaves)
    let mut active: Vec<(usize, Vec<usize>)> = (0..n).map(|i| (i, vec![i])).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    while active.len() > 1 {
        let mut best = (f64::INFINITY, 0usize, 1usize);
        for a in 0..active.len() {
            for b in (a + 1)..active.len() {
                let d = active[a]
                    .1
                    .iter()
                    .flat_map(|&i| active[b].1.iter().map(move |&j| dist[[i, j]]))
                    .fold(f64::INFINITY, f64::min);
                if d < best.0 {
                    best = (d, a, b);
                }
            }
        }

        let (_, a, b) = best;
        let (id_b, members_b) = active.remove(b);
        let (id_a, mut members_a) = active.remove(a);
        members_a.extend(members_b);

        let new_id = n + merges.len();
        merges.push(Merge {
            left: id_a.min(id_b),
            right: id_a.max(id_b),
        });
        active.push((new_id, members_a));
    }

    merges
}

/// Leaf order of the merge tree, left subtree before right.
pub fn quasi_diagonal_order(merges: &[Merge], n: usize) -> Vec<usize> {
    fn flatten(id: usize, merges: &[Merge], n: usize, out: &mut Vec<usize>) {
        if id < n {
            out.push(id);
        } else {
            let merge = &merges[id - n];
            flatten(merge.left, merges, n, out);
            flatten(merge.right, merges, n, out);
        }
    }

    let mut out = Vec::with_capacity(n);
    match merges.len() {
        0 => out.extend(0..n),
        len => flatten(n + len - 1, merges, n, &mut out),
    }
    out
}

/// Split `order` in halves until every cluster is a single asset. The left
/// half receives `α = 1 - var_left / (var_left + var_right)` of the parent's
/// weight.
pub fn recursive_bisection(cov: &CovarianceMatrix, order: &[usize]) -> Array1<f64> {
    let mut weights = Array1::ones(cov.len());
    let mut pending: Vec<&[usize]> = vec![order];

    while let Some(cluster) = pending.pop() {
        if cluster.len() < 2 {
            continue;
        }
        let (left, right) = cluster.split_at(cluster.len() / 2);

        let var_left = cluster_variance(cov, left);
        let var_right = cluster_variance(cov, right);
        let total = var_left + var_right;
        let alpha = if total > 0.0 { 1.0 - var_left / total } else { 0.5 };

        for &i in left {
            weights[i] *= alpha;
        }
        for &i in right {
            weights[i] *= 1.0 - alpha;
        }

        pending.push(left);
        pending.push(right);
    }

    weights
}

/// `ivpᵀ Σ ivp` with `ivp ∝ 1 / diag(Σ)` normalised to sum to one.
pub fn cluster_variance(cov: &CovarianceMatrix, members: &[usize]) -> f64 {
    let block = cov.values().select(Axis(0), members).select(Axis(1), members);
    let inv = block.diag().mapv(|v| 1.0 / v.max(VARIANCE_FLOOR));
    let ivp = &inv / inv.sum();
    ivp.dot(&block.dot(&ivp))
}
