//! Portfolio weight vectors keyed by ticker.

use serde::Serialize;
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// Fraction of portfolio value per ticker.
///
/// Backed by a `BTreeMap` so iteration order (and therefore every sum,
/// trade list and export) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Weights {
    inner: BTreeMap<String, f64>,
}

impl Weights {
    pub fn new() -> Self {
        Weights {
            inner: BTreeMap::new(),
        }
    }

    /// `1/N` for every ticker. Empty input gives empty weights.
    pub fn equal<S: AsRef<str>>(tickers: &[S]) -> Self {
        if tickers.is_empty() {
            return Weights::new();
        }
        let w = 1.0 / tickers.len() as f64;
        tickers.iter().map(|t| (t.as_ref().to_string(), w)).collect()
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        pairs.into_iter().map(|(t, w)| (t.into(), w)).collect()
    }

    pub fn get(&self, ticker: &str) -> f64 {
        self.inner.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.inner.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.inner.values().sum()
    }

    pub fn max_weight(&self) -> f64 {
        self.inner.values().copied().fold(0.0, f64::max)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.inner.iter().map(|(t, &w)| (t.as_str(), w))
    }

    /// Number of tickers with a strictly positive weight.
    pub fn position_count(&self) -> usize {
        self.inner.values().filter(|&&w| w > 0.0).count()
    }

    /// Divide every weight by the total. Returns `false` (and leaves the
    /// weights untouched) when the total is not positive.
    pub fn normalize(&mut self) -> bool {
        let total = self.sum();
        if !(total > 0.0 && total.is_finite()) {
            return false;
        }
        for w in self.inner.values_mut() {
            *w /= total;
        }
        true
    }

    /// Drop entries whose weight is zero, negative or non-finite.
    pub fn retain_positive(&mut self) {
        self.inner.retain(|_, w| *w > 0.0 && w.is_finite());
    }

    /// Sorted union of the tickers in `self` and `other`.
    pub fn union_tickers<'a>(&'a self, other: &'a Weights) -> Vec<&'a str> {
        let set: BTreeSet<&str> = self.tickers().chain(other.tickers()).collect();
        set.into_iter().collect()
    }
}

impl FromIterator<(String, f64)> for Weights {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Weights {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Weights {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

/// Half the sum of absolute weight changes over the union of tickers.
/// Tickers missing from either side count as zero weight.
pub fn turnover(new: &Weights, old: &Weights) -> f64 {
    new.union_tickers(old)
        .into_iter()
        .map(|t| (new.get(t) - old.get(t)).abs())
        .sum::<f64>()
        / 2.0
}
