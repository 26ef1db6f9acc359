//! `matterflow-analytics` — pure financial aggregation math.
//!
//! Deterministic functions over dated billing amounts. No storage, no IO:
//! the financial rollup handler and the financials tool both call into
//! here, and property tests pin the numeric semantics.

pub mod billing;

pub use billing::{
    BilledAmount, FinancialSnapshot, MonthKey, MonthlyTotal, cumulative, monthly_totals,
    utilization_percent, variance, variance_percent, velocity,
};
