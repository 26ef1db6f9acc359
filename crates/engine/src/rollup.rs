//! Financial-rollup work step: recompute a matter's totals from its
//! billing line items.

use chrono::NaiveDate;
use serde_json::json;

use matterflow_analytics::{BilledAmount, FinancialSnapshot};
use matterflow_core::{CancellationToken, WorkError, WorkResult};
use matterflow_jobs::{JobContract, JobPayload, StepResult, WorkStep};
use matterflow_records::{Fields, RecordStore, RetryPolicy, VersionedRecord, update_with_retry};

use crate::schema::{
    AMOUNT_FIELD, BILLING_EVENT_ENTITY, BUDGET_FIELD, MATTER_ENTITY, MONTHLY_TOTALS_FIELD,
    OCCURRED_ON_FIELD, SPEND_FIELD, UTILIZATION_PERCENT_FIELD, VARIANCE_FIELD,
    VARIANCE_PERCENT_FIELD,
};

/// Parse billing-event child records into dated amounts.
///
/// A child missing its amount or date is corrupt data, not an outage:
/// the error classifies as permanent so the job dead-letters for triage
/// instead of retrying forever.
pub fn billed_amounts(children: &[VersionedRecord]) -> WorkResult<Vec<BilledAmount>> {
    children
        .iter()
        .map(|record| {
            let amount = record.i64_field(AMOUNT_FIELD).ok_or_else(|| {
                WorkError::malformed(format!(
                    "billing event {} has no integer '{AMOUNT_FIELD}' field",
                    record.id
                ))
            })?;
            let raw_date = record.str_field(OCCURRED_ON_FIELD).ok_or_else(|| {
                WorkError::malformed(format!(
                    "billing event {} has no '{OCCURRED_ON_FIELD}' field",
                    record.id
                ))
            })?;
            let occurred_on = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
                WorkError::malformed(format!(
                    "billing event {} has unparseable date '{raw_date}': {e}",
                    record.id
                ))
            })?;
            Ok(BilledAmount::new(amount, occurred_on))
        })
        .collect()
}

/// Matter fields written from a computed snapshot.
pub fn snapshot_fields(snapshot: &FinancialSnapshot) -> Fields {
    let monthly: Vec<_> = snapshot
        .monthly
        .iter()
        .map(|m| {
            json!({
                "month": m.month.to_string(),
                "total": m.total,
                "velocity_percent": m.velocity_percent,
            })
        })
        .collect();

    let mut fields = Fields::new();
    fields.insert(SPEND_FIELD.to_string(), json!(snapshot.cumulative));
    fields.insert(VARIANCE_FIELD.to_string(), json!(snapshot.variance));
    fields.insert(
        VARIANCE_PERCENT_FIELD.to_string(),
        json!(snapshot.variance_percent),
    );
    fields.insert(
        UTILIZATION_PERCENT_FIELD.to_string(),
        json!(snapshot.utilization_percent),
    );
    fields.insert(MONTHLY_TOTALS_FIELD.to_string(), json!(monthly));
    fields
}

/// Recalculates the full financial snapshot from the billing children and
/// writes it onto the matter record under optimistic concurrency.
///
/// Recalculate-from-children rather than increment-by-delta: the rollup
/// is triggered per line-item change but must converge to the same totals
/// regardless of delivery order or duplication.
pub struct FinancialRollupStep<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S> FinancialRollupStep<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait::async_trait]
impl<S> WorkStep for FinancialRollupStep<S>
where
    S: RecordStore,
{
    fn job_type(&self) -> &'static str {
        "financial_rollup"
    }

    async fn run(&self, job: &JobContract, cancel: &CancellationToken) -> StepResult {
        let JobPayload::FinancialRollup { .. } = &job.payload else {
            return StepResult::failed(WorkError::malformed(
                "payload is not a financial-rollup job",
            ));
        };
        if let Err(e) = cancel.check() {
            return StepResult::failed(e);
        }

        let children = match self
            .store
            .query_aggregate_children(BILLING_EVENT_ENTITY, job.subject_id, cancel)
            .await
        {
            Ok(children) => children,
            Err(e) => return StepResult::failed(e.into()),
        };
        let amounts = match billed_amounts(&children) {
            Ok(amounts) => amounts,
            Err(e) => return StepResult::failed(e),
        };

        let write = update_with_retry(
            &self.store,
            MATTER_ENTITY,
            job.subject_id,
            &self.policy,
            cancel,
            |record| {
                // Budget is taken from the fresh read on every attempt, so
                // a concurrent budget change is never overwritten with a
                // snapshot derived from the stale value.
                let budget = record.i64_field(BUDGET_FIELD).unwrap_or(0);
                Ok(snapshot_fields(&FinancialSnapshot::compute(budget, &amounts)))
            },
        )
        .await;

        match write {
            Ok(_) => StepResult::completed(),
            Err(e) => StepResult::failed(e),
        }
    }
}
