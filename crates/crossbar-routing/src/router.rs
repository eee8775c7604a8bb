//! Routing orchestrator
//!
//! Chains the three tiers: rule table, classifier + selector, policy
//! fallback. Produces a [`RoutingDecision`] or signals that no model can
//! serve the request.

use crossbar_store::{BudgetLedger, Policy, RuleAction, Store};

use crate::classifier::ClassifierClient;
use crate::error::RoutingError;
use crate::metadata::RequestMeta;
use crate::rules::RuleMatcher;
use crate::selector::{SelectionCriteria, Selector};
use crate::{RankedCandidate, RoutingDecision, RoutingTier};

/// Quality floor used when a complexity label has no lookup row
const DEFAULT_QUALITY_FLOOR: i64 = 40;

/// The three-tier decision engine
pub struct Router {
    store: Store,
    rules: RuleMatcher,
    classifier: ClassifierClient,
    selector: Selector,
}

impl Router {
    /// Assemble the engine over shared store and ledger handles
    pub fn new(store: Store, ledger: BudgetLedger, classifier: ClassifierClient) -> Self {
        Self {
            rules: RuleMatcher::new(store.clone()),
            selector: Selector::new(store.clone(), ledger),
            store,
            classifier,
        }
    }

    /// Drop the rule cache so operator edits take effect immediately
    pub fn invalidate_rules(&self) {
        self.rules.invalidate();
    }

    /// Run the three tiers against one request's metadata
    ///
    /// # Errors
    ///
    /// `RoutingError::NoAvailableModel` when a rule rejects the request
    /// or every tier comes up empty; store errors are fatal as-is.
    pub async fn route(&self, meta: &RequestMeta) -> Result<RoutingDecision, RoutingError> {
        let policy = self.store.load_policy().await?;

        // Tier 1: deterministic rules
        let mut rule_id = None;
        if let Some(rule) = self.rules.match_request(meta).await? {
            rule_id = Some(rule.id);

            match rule.action {
                RuleAction::Route | RuleAction::RouteSelf => {
                    let target = if rule.action == RuleAction::RouteSelf {
                        rule.target_model_id.clone().or_else(|| policy.self_model_id.clone())
                    } else {
                        rule.target_model_id.clone()
                    };

                    if let Some(target_id) = target {
                        if let Some(model) = self.store.get_model(&target_id).await? {
                            tracing::debug!(
                                rule_id = rule.id,
                                model = %model.id,
                                "rule short-circuited routing"
                            );
                            return Ok(RoutingDecision {
                                tier: RoutingTier::Rules,
                                rule_id,
                                classification: None,
                                candidates: vec![RankedCandidate { rank: 1, model }],
                            });
                        }
                        // A rule naming a model that no longer exists falls
                        // through to classification rather than failing
                        tracing::warn!(
                            rule_id = rule.id,
                            target = %target_id,
                            "rule target model not found, falling through"
                        );
                    }
                }
                RuleAction::Reject => {
                    tracing::info!(rule_id = rule.id, "rule rejected request");
                    return Err(RoutingError::NoAvailableModel);
                }
                RuleAction::Classify | RuleAction::Queue => {}
            }
        }

        // Tier 2: classification, degrading to defaults internally
        let router_model = policy
            .router_model_id
            .as_deref()
            .map(|id| id.rsplit('/').next().unwrap_or(id));
        let classification = self
            .classifier
            .classify(&meta.text_preview, router_model)
            .await;

        let quality_floor = self
            .store
            .quality_floor_for(&classification.complexity.to_string())
            .await?
            .unwrap_or(DEFAULT_QUALITY_FLOOR);
        let capability = self
            .store
            .capability_for(&classification.task_type.to_string())
            .await?;

        let criteria = SelectionCriteria {
            quality_floor,
            capability,
            sensitive: classification.sensitive,
            estimated_tokens: classification.estimated_tokens as i64,
        };

        let candidates = self.selector.select(&criteria, &policy).await?;
        if !candidates.is_empty() {
            return Ok(RoutingDecision {
                tier: RoutingTier::Classifier,
                rule_id,
                classification: Some(classification),
                candidates,
            });
        }

        // Tier 3: last resort, ignoring privacy and budget gates
        let fallback = self.fallback_candidates(&policy).await?;
        if fallback.is_empty() {
            return Err(RoutingError::NoAvailableModel);
        }

        tracing::info!("selection empty, using policy fallback model");
        Ok(RoutingDecision {
            tier: RoutingTier::Fallback,
            rule_id,
            classification: Some(classification),
            candidates: fallback,
        })
    }

    /// Single-entry list naming the policy fallback, or empty
    async fn fallback_candidates(
        &self,
        policy: &Policy,
    ) -> Result<Vec<RankedCandidate>, RoutingError> {
        let Some(fallback_id) = &policy.fallback_model_id else {
            return Ok(Vec::new());
        };

        match self.store.get_model(fallback_id).await? {
            Some(model) if model.enabled && model.healthy => {
                Ok(vec![RankedCandidate { rank: 1, model }])
            }
            _ => Ok(Vec::new()),
        }
    }
}
