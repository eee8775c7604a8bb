//! Tier-1 deterministic rule matching
//!
//! Rules load from the registry through a short-lived cache and are
//! evaluated in ascending priority order. The first rule whose specified
//! predicates all hold wins; unspecified predicates are wildcards.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crossbar_store::{RoutingRule, Store, StoreError};

use crate::metadata::RequestMeta;

/// How long a loaded rule set may be served from memory
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Regex predicates see at most this many preview characters
const PATTERN_PREVIEW_CAP: usize = 500;

struct CachedRules {
    rules: Vec<RoutingRule>,
    loaded_at: Instant,
}

/// Rule table evaluator with a TTL cache
pub struct RuleMatcher {
    store: Store,
    cache: RwLock<Option<CachedRules>>,
}

impl RuleMatcher {
    /// Create a matcher over the registry
    pub const fn new(store: Store) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached rule set so the next match reloads
    pub fn invalidate(&self) {
        *self.cache.write().expect("rules cache poisoned") = None;
    }

    /// Return the first enabled rule matching the request metadata
    ///
    /// # Errors
    ///
    /// Returns a store error when the rule table cannot be read.
    pub async fn match_request(
        &self,
        meta: &RequestMeta,
    ) -> Result<Option<RoutingRule>, StoreError> {
        let rules = self.load().await?;
        Ok(rules.into_iter().find(|rule| rule_matches(rule, meta)))
    }

    async fn load(&self) -> Result<Vec<RoutingRule>, StoreError> {
        {
            let cache = self.cache.read().expect("rules cache poisoned");
            if let Some(cached) = cache.as_ref()
                && cached.loaded_at.elapsed() < CACHE_TTL
            {
                return Ok(cached.rules.clone());
            }
        }

        let rules = self.store.load_rules().await?;
        *self.cache.write().expect("rules cache poisoned") = Some(CachedRules {
            rules: rules.clone(),
            loaded_at: Instant::now(),
        });
        Ok(rules)
    }
}

/// Whether every predicate the rule specifies is satisfied
fn rule_matches(rule: &RoutingRule, meta: &RequestMeta) -> bool {
    if let Some(source) = &rule.source
        && meta.source.as_deref() != Some(source.as_str())
    {
        return false;
    }

    if let Some(channel) = &rule.channel
        && meta.channel.as_deref() != Some(channel.as_str())
    {
        return false;
    }

    if let Some(token_max) = rule.token_max
        && meta.estimated_tokens > token_max
    {
        return false;
    }

    if let Some(has_media) = rule.has_media
        && meta.has_media != has_media
    {
        return false;
    }

    if let Some(pattern) = &rule.pattern {
        // Bounded preview caps worst-case pattern cost
        let preview: String = meta.text_preview.chars().take(PATTERN_PREVIEW_CAP).collect();
        match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => {
                if !re.is_match(&preview) {
                    return false;
                }
            }
            Err(e) => {
                // A bad pattern disables this rule, not the whole tier
                tracing::warn!(rule_id = rule.id, error = %e, "skipping rule with invalid pattern");
                return false;
            }
        }
    }

    true
}
