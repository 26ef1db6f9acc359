//! Record schema names shared by the handlers and tools.
//!
//! The record store is schemaless from the engine's point of view; these
//! constants pin the entity and field names the pipeline reads and writes
//! so handlers and tools never drift apart.

/// Parent entity carrying the profile summary and financial totals.
pub const MATTER_ENTITY: &str = "matter";

/// Child entity holding one billing line item per record.
pub const BILLING_EVENT_ENTITY: &str = "billing_event";

/// Matter field: AI-extracted profile summary text.
pub const SUMMARY_FIELD: &str = "profile_summary";

/// Matter field: extraction confidence for the stored summary.
pub const SUMMARY_CONFIDENCE_FIELD: &str = "profile_summary_confidence";

/// Matter field: approved budget in the smallest currency unit.
pub const BUDGET_FIELD: &str = "budget";

/// Matter field: cumulative billed spend in the smallest currency unit.
pub const SPEND_FIELD: &str = "spend_to_date";

/// Matter field: budget minus spend.
pub const VARIANCE_FIELD: &str = "budget_variance";

/// Matter field: variance as a percentage of budget.
pub const VARIANCE_PERCENT_FIELD: &str = "budget_variance_percent";

/// Matter field: spend as a percentage of budget.
pub const UTILIZATION_PERCENT_FIELD: &str = "budget_utilization_percent";

/// Matter field: per-month totals with velocities, as a JSON array.
pub const MONTHLY_TOTALS_FIELD: &str = "monthly_totals";

/// Billing-event field: amount in the smallest currency unit.
pub const AMOUNT_FIELD: &str = "amount";

/// Billing-event field: date the amount was billed, ISO `YYYY-MM-DD`.
pub const OCCURRED_ON_FIELD: &str = "occurred_on";

/// Character budget for the stored summary field.
pub const SUMMARY_MAX_CHARS: usize = 2000;
