//! Billing aggregation over dated amounts.
//!
//! Amounts are `i64` in the smallest currency unit (cents). All functions
//! are pure: a fixed input list yields identical output on every run.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One billing event against a matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilledAmount {
    /// Amount in smallest unit (e.g., cents).
    pub amount: i64,
    pub occurred_on: NaiveDate,
}

impl BilledAmount {
    pub fn new(amount: i64, occurred_on: NaiveDate) -> Self {
        Self {
            amount,
            occurred_on,
        }
    }
}

/// Calendar month bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl core::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One month's total, with its velocity against the prior bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub month: MonthKey,
    pub total: i64,
    /// Month-over-month velocity in percent against the previous bucket.
    /// `None` for the first bucket and whenever the prior total is zero
    /// (no baseline — not zero, not an error).
    pub velocity_percent: Option<f64>,
}

/// Sum amounts into calendar-month buckets, oldest first.
pub fn monthly_totals(amounts: &[BilledAmount]) -> Vec<(MonthKey, i64)> {
    let mut buckets = std::collections::BTreeMap::new();
    for item in amounts {
        *buckets.entry(MonthKey::of(item.occurred_on)).or_insert(0i64) += item.amount;
    }
    buckets.into_iter().collect()
}

/// Cumulative-to-date total.
pub fn cumulative(amounts: &[BilledAmount]) -> i64 {
    amounts.iter().map(|a| a.amount).sum()
}

/// Budget minus spend; positive = under budget.
pub fn variance(budget: i64, spend: i64) -> i64 {
    budget - spend
}

/// Variance as a percentage of budget; 0 when budget is zero.
pub fn variance_percent(budget: i64, spend: i64) -> f64 {
    if budget == 0 {
        return 0.0;
    }
    variance(budget, spend) as f64 / budget as f64 * 100.0
}

/// Spend as a percentage of budget; 0 when budget is zero (never a
/// division error).
pub fn utilization_percent(spend: i64, budget: i64) -> f64 {
    if budget == 0 {
        return 0.0;
    }
    spend as f64 / budget as f64 * 100.0
}

/// Month-over-month velocity in percent; `None` when the prior month is
/// zero (no baseline).
pub fn velocity(current: i64, prior: i64) -> Option<f64> {
    if prior == 0 {
        return None;
    }
    Some((current - prior) as f64 / prior as f64 * 100.0)
}

/// Full financial summary for a matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub budget: i64,
    pub cumulative: i64,
    pub variance: i64,
    pub variance_percent: f64,
    pub utilization_percent: f64,
    pub monthly: Vec<MonthlyTotal>,
}

impl FinancialSnapshot {
    /// Compute the snapshot for a budget and a list of billing events.
    ///
    /// Velocities are taken between adjacent month buckets in calendar
    /// order.
    pub fn compute(budget: i64, amounts: &[BilledAmount]) -> Self {
        let totals = monthly_totals(amounts);
        let spend = cumulative(amounts);

        let mut monthly = Vec::with_capacity(totals.len());
        let mut prior: Option<i64> = None;
        for (month, total) in totals {
            let velocity_percent = prior.and_then(|p| velocity(total, p));
            monthly.push(MonthlyTotal {
                month,
                total,
                velocity_percent,
            });
            prior = Some(total);
        }

        Self {
            budget,
            cumulative: spend,
            variance: variance(budget, spend),
            variance_percent: variance_percent(budget, spend),
            utilization_percent: utilization_percent(spend, budget),
            monthly,
        }
    }
}
