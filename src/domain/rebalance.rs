//! Rebalance calendar.

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceFrequency {
    Daily,
    /// Every Monday that is a trading day.
    Weekly,
    /// First trading day of each calendar month.
    Monthly,
    /// First trading day of each calendar quarter.
    Quarterly,
}

impl FromStr for RebalanceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            other => Err(format!(
                "unknown rebalance frequency '{other}' (expected daily, weekly, monthly or quarterly)"
            )),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
        };
        f.write_str(name)
    }
}

/// One flag per date: `true` where a rebalance is scheduled.
/// `dates` must be ascending.
pub fn rebalance_schedule(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Vec<bool> {
    let period = |d: &NaiveDate| -> (i32, u32) {
        match frequency {
            RebalanceFrequency::Monthly => (d.year(), d.month()),
            _ => (d.year(), d.month0() / 3),
        }
    };

    dates
        .iter()
        .enumerate()
        .map(|(i, d)| match frequency {
            RebalanceFrequency::Daily => true,
            RebalanceFrequency::Weekly => d.weekday() == Weekday::Mon,
            RebalanceFrequency::Monthly | RebalanceFrequency::Quarterly => {
                i == 0 || period(&dates[i - 1]) != period(d)
            }
        })
        .collect()
}
