//! SQLite-backed model registry, routing state, and budget ledger
//!
//! A single embedded database holds the model fleet, routing rules, the
//! routing policy, rate-limit and health state, spend accumulators, and
//! the request log. All access goes through [`Store`], a cloneable handle
//! over a background-thread connection.

mod ledger;
mod schema;
mod store;
mod types;

pub use ledger::{BudgetLedger, BudgetStatus};
pub use store::{Store, StoreError};
pub use types::{
    HealthPoint, Location, ModelHealthCounts, ModelRecord, Policy, RequestLogRow, RoutingRule,
    RuleAction, SpendPeriod, SpendRow, WireFormat,
};

/// Consecutive probe failures after which a model is flagged unhealthy
pub const UNHEALTHY_THRESHOLD: i64 = 3;
