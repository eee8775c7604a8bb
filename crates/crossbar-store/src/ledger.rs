//! Budget ledger over the spend table
//!
//! Accumulates per-day and per-month cost for priced requests and answers
//! the `is_exceeded` question the candidate selector gates on.

use jiff::Timestamp;

use crate::store::{Store, StoreError};
use crate::types::{ModelRecord, Policy, SpendPeriod};

/// Current spend against configured limits
#[derive(Debug, Clone, Copy)]
pub struct BudgetStatus {
    /// Spend accumulated today (USD)
    pub daily_spend: f64,
    /// Daily limit from policy (0 = unlimited)
    pub daily_limit: f64,
    /// Spend accumulated this month (USD)
    pub monthly_spend: f64,
    /// Monthly limit from policy (0 = unlimited)
    pub monthly_limit: f64,
}

/// Per-day and per-month cost accounting
#[derive(Clone)]
pub struct BudgetLedger {
    store: Store,
}

impl BudgetLedger {
    /// Wrap a store handle
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record the cost of one completed request
    ///
    /// Zero-cost requests (all co-located and LAN models) are a no-op.
    /// Both period rows are updated in a single transaction so the
    /// accumulators can never diverge within a process run.
    pub async fn record_request_cost(
        &self,
        model: &ModelRecord,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), StoreError> {
        let cost = model.cost_usd(input_tokens, output_tokens);
        if cost <= 0.0 {
            return Ok(());
        }

        let now = Timestamp::now();
        self.store
            .record_spend(
                &daily_key(now),
                &monthly_key(now),
                cost,
                input_tokens as i64,
                output_tokens as i64,
            )
            .await?;

        tracing::debug!(model = %model.id, cost_usd = cost, "recorded request cost");
        Ok(())
    }

    /// Whether either period's accumulated spend has reached its limit
    pub async fn is_exceeded(&self, policy: &Policy) -> Result<bool, StoreError> {
        let status = self.status(policy).await?;
        let daily_hit = status.daily_limit > 0.0 && status.daily_spend >= status.daily_limit;
        let monthly_hit =
            status.monthly_limit > 0.0 && status.monthly_spend >= status.monthly_limit;
        Ok(daily_hit || monthly_hit)
    }

    /// Current spend and limits for both periods
    pub async fn status(&self, policy: &Policy) -> Result<BudgetStatus, StoreError> {
        let now = Timestamp::now();
        let daily = self
            .store
            .get_spend(SpendPeriod::Daily, &daily_key(now))
            .await?;
        let monthly = self
            .store
            .get_spend(SpendPeriod::Monthly, &monthly_key(now))
            .await?;

        Ok(BudgetStatus {
            daily_spend: daily.map_or(0.0, |r| r.total_spend_usd),
            daily_limit: policy.daily_budget_usd,
            monthly_spend: monthly.map_or(0.0, |r| r.total_spend_usd),
            monthly_limit: policy.monthly_budget_usd,
        })
    }
}

/// ISO date key in UTC
fn daily_key(now: Timestamp) -> String {
    now.strftime("%Y-%m-%d").to_string()
}

/// Year-month key in UTC
fn monthly_key(now: Timestamp) -> String {
    now.strftime("%Y-%m").to_string()
}
