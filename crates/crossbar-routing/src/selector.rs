//! Candidate selection and ranking
//!
//! Filters the registry down to models that can serve the request, then
//! orders them by location preference, cost, and quality. Filter order is
//! load-bearing: the budget gate and rate-limit expiry run before any
//! model is considered, and the quality tolerance is applied last because
//! it is the only soft filter.

use std::collections::HashSet;

use crossbar_store::{BudgetLedger, Location, Policy, Store, StoreError};
use jiff::Timestamp;

use crate::RankedCandidate;

/// What the classifier (or a caller) asks of a candidate
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Minimum quality score, subject to the soft tolerance
    pub quality_floor: i64,
    /// Required capability, wildcarded when absent
    pub capability: Option<String>,
    /// Excludes cloud models when set
    pub sensitive: bool,
    /// Minimum context window
    pub estimated_tokens: i64,
}

/// Ranks registry models against selection criteria
pub struct Selector {
    store: Store,
    ledger: BudgetLedger,
}

impl Selector {
    /// Create a selector over the registry and ledger
    pub const fn new(store: Store, ledger: BudgetLedger) -> Self {
        Self { store, ledger }
    }

    /// Produce the ranked candidate list, empty when nothing qualifies
    ///
    /// # Errors
    ///
    /// Returns a store error when any registry read fails.
    pub async fn select(
        &self,
        criteria: &SelectionCriteria,
        policy: &Policy,
    ) -> Result<Vec<RankedCandidate>, StoreError> {
        // Evaluated once per request, before any filtering
        let budget_exceeded = self.ledger.is_exceeded(policy).await?;
        self.store
            .clear_expired_limits(Timestamp::now().as_second())
            .await?;

        let base = self
            .store
            .list_enabled_healthy_models(criteria.capability.as_deref())
            .await?;
        let limited: HashSet<String> = self.store.list_rate_limited().await?.into_iter().collect();

        let filtered: Vec<_> = base
            .into_iter()
            .filter(|m| !limited.contains(&m.provider))
            .filter(|m| m.context_window >= criteria.estimated_tokens)
            .filter(|m| !(criteria.sensitive && m.location == Location::Cloud))
            .filter(|m| !(budget_exceeded && m.location == Location::Cloud))
            .collect();

        let floor = criteria.quality_floor.max(policy.min_quality_score);

        // Strict quality first; only zero-cost models may reach above
        // their weight, and only when the strict set is empty
        let strict: Vec<_> = filtered
            .iter()
            .filter(|m| m.quality_score >= floor)
            .cloned()
            .collect();
        let mut pool = if strict.is_empty() {
            filtered
                .into_iter()
                .filter(|m| {
                    m.quality_score >= floor - policy.quality_tolerance
                        && m.price_out_per_mtok == 0.0
                })
                .collect()
        } else {
            strict
        };

        let preference = policy.location_preference();
        let location_index = |location: Location| {
            preference
                .iter()
                .position(|&p| p == location)
                .unwrap_or(preference.len())
        };

        pool.sort_by(|a, b| {
            location_index(a.location)
                .cmp(&location_index(b.location))
                .then_with(|| a.combined_price().total_cmp(&b.combined_price()))
                .then_with(|| b.quality_score.cmp(&a.quality_score))
        });

        Ok(pool
            .into_iter()
            .enumerate()
            .map(|(i, model)| RankedCandidate {
                rank: i as u32 + 1,
                model,
            })
            .collect())
    }
}
