//! Concrete tool handlers over the record store.
//!
//! Expected failures (missing parameters, missing records) come back as
//! failed results with descriptive messages; the registry flattens
//! anything unexpected.

use serde_json::json;

use matterflow_ai::{ToolHandler, ToolParameters, ToolResult};
use matterflow_analytics::FinancialSnapshot;
use matterflow_core::CancellationToken;
use matterflow_records::RecordStore;

use crate::rollup::billed_amounts;
use crate::schema::{
    BILLING_EVENT_ENTITY, BUDGET_FIELD, MATTER_ENTITY, SUMMARY_CONFIDENCE_FIELD, SUMMARY_FIELD,
};

/// On-demand financial snapshot for one matter, computed live from the
/// billing children rather than read from the rolled-up record.
pub struct MatterFinancialsTool<S> {
    store: S,
}

impl<S> MatterFinancialsTool<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl<S> ToolHandler for MatterFinancialsTool<S>
where
    S: RecordStore,
{
    fn name(&self) -> &'static str {
        "matter_financials"
    }

    async fn execute(
        &self,
        params: &ToolParameters,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ToolResult> {
        let subject = match params.matter_id("matter_id") {
            Ok(id) => id,
            Err(msg) => return Ok(ToolResult::fail(msg)),
        };

        let matter = match self.store.get(MATTER_ENTITY, subject, cancel).await {
            Ok(record) => record,
            Err(e) => return Ok(ToolResult::fail(e.to_string())),
        };
        let budget = matter.i64_field(BUDGET_FIELD).unwrap_or(0);

        let children = match self
            .store
            .query_aggregate_children(BILLING_EVENT_ENTITY, subject, cancel)
            .await
        {
            Ok(children) => children,
            Err(e) => return Ok(ToolResult::fail(e.to_string())),
        };
        let amounts = match billed_amounts(&children) {
            Ok(amounts) => amounts,
            Err(e) => return Ok(ToolResult::fail(e.to_string())),
        };

        let snapshot = FinancialSnapshot::compute(budget, &amounts);
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

        Ok(ToolResult::ok(json!({
            "matter_id": subject.to_string(),
            "budget": snapshot.budget,
            "cumulative_spend": snapshot.cumulative,
            "variance": snapshot.variance,
            "variance_percent": snapshot.variance_percent,
            "utilization_percent": snapshot.utilization_percent,
            "monthly": monthly,
        })))
    }
}

/// Returns the stored AI profile summary for one matter.
pub struct ProfileSummaryTool<S> {
    store: S,
}

impl<S> ProfileSummaryTool<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl<S> ToolHandler for ProfileSummaryTool<S>
where
    S: RecordStore,
{
    fn name(&self) -> &'static str {
        "profile_summary"
    }

    async fn execute(
        &self,
        params: &ToolParameters,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ToolResult> {
        let subject = match params.matter_id("matter_id") {
            Ok(id) => id,
            Err(msg) => return Ok(ToolResult::fail(msg)),
        };

        let matter = match self.store.get(MATTER_ENTITY, subject, cancel).await {
            Ok(record) => record,
            Err(e) => return Ok(ToolResult::fail(e.to_string())),
        };
        let Some(summary) = matter.str_field(SUMMARY_FIELD) else {
            return Ok(ToolResult::fail(format!(
                "matter {subject} has no stored profile summary"
            )));
        };

        Ok(ToolResult::ok(json!({
            "matter_id": subject.to_string(),
            "summary": summary,
            "confidence": matter.fields.get(SUMMARY_CONFIDENCE_FIELD),
        })))
    }
}
