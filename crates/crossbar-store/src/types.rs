use strum::{Display, EnumString};

/// Deployment class of a model endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Location {
    /// Same host as the gateway
    Colocated,
    /// Reachable on the operator's private network
    Lan,
    /// External commercial API
    Cloud,
}

/// Wire protocol spoken by a backend endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WireFormat {
    /// OpenAI chat-completions shape
    #[default]
    Openai,
    /// Anthropic Messages shape
    Anthropic,
}

/// What a matched routing rule does with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RuleAction {
    /// Route to the rule's target model
    Route,
    /// Route to the configured self model
    RouteSelf,
    /// Fall through to the classifier tier
    Classify,
    /// Refuse the request
    Reject,
    /// Defer the request (treated as fall-through)
    Queue,
}

/// One model in the fleet, identified by `{provider}/{name}`
#[derive(Debug, Clone)]
pub struct ModelRecord {
    /// Stable identity, `{provider_prefix}/{name}`
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Provider tag (rate limits are scoped to this)
    pub provider: String,
    /// Deployment class
    pub location: Location,
    /// Base URL of the backend endpoint
    pub endpoint: String,
    /// Wire protocol tag
    pub wire_format: WireFormat,
    /// Name of the env var carrying this model's credential
    pub api_key_env: Option<String>,
    /// Fleet-relative quality score, 0..=100
    pub quality_score: i64,
    /// Context window in tokens
    pub context_window: i64,
    /// Default max output tokens when the request names none
    pub max_output_tokens: i64,
    /// Tool/function calling support
    pub supports_tools: bool,
    /// Vision input support
    pub supports_vision: bool,
    /// Extended reasoning support
    pub supports_reasoning: bool,
    /// USD per million input tokens
    pub price_in_per_mtok: f64,
    /// USD per million output tokens
    pub price_out_per_mtok: f64,
    /// USD per million cache-read tokens
    pub price_cache_read_per_mtok: f64,
    /// USD per million cache-write tokens
    pub price_cache_write_per_mtok: f64,
    /// Observed p50 latency in milliseconds
    pub latency_p50_ms: Option<f64>,
    /// Observed p95 latency in milliseconds
    pub latency_p95_ms: Option<f64>,
    /// Free-form hardware note
    pub hardware: Option<String>,
    /// Whether the model participates in routing at all
    pub enabled: bool,
    /// Derived health flag (see health log)
    pub healthy: bool,
    /// Unix seconds of the last probe
    pub last_health_check: Option<i64>,
    /// Unix seconds of the last dispatch
    pub last_used_at: Option<i64>,
}

impl ModelRecord {
    /// Model name as sent to the backend: the last path segment of the
    /// internal id when a provider prefix is present
    pub fn upstream_name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    /// Combined input + output price, the selector's cost sort key
    pub fn combined_price(&self) -> f64 {
        self.price_in_per_mtok + self.price_out_per_mtok
    }

    /// Cost of a completed request in USD
    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64).mul_add(
            self.price_in_per_mtok,
            (output_tokens as f64) * self.price_out_per_mtok,
        ) / 1_000_000.0
    }
}

/// One routing rule, evaluated in ascending priority order
///
/// Every predicate is optional; a predicate left unset matches anything.
/// A rule with no predicates at all is a catch-all.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Row id
    pub id: i64,
    /// Evaluation order, lower first
    pub priority: i64,
    /// Exact match on the request source tag
    pub source: Option<String>,
    /// Exact match on the request channel tag
    pub channel: Option<String>,
    /// Case-insensitive regex against the text preview
    pub pattern: Option<String>,
    /// Upper bound on estimated tokens
    pub token_max: Option<i64>,
    /// Match on whether the request carries structured media content
    pub has_media: Option<bool>,
    /// Target model for `route` (and optionally `route_self`)
    pub target_model_id: Option<String>,
    /// What to do on match
    pub action: RuleAction,
    /// Disabled rules are never loaded
    pub enabled: bool,
}

/// The singleton routing policy
#[derive(Debug, Clone)]
pub struct Policy {
    /// Operator floor on quality for any routed model
    pub min_quality_score: i64,
    /// Operator ceiling on combined per-million price
    pub max_cost_per_million: f64,
    /// Operator ceiling on model latency
    pub max_latency_ms: i64,
    /// Comma-separated location order, most preferred first
    pub preferred_locations: String,
    /// Slack below the quality floor granted to zero-priced models
    pub quality_tolerance: i64,
    /// Daily budget in USD (0 disables the gate)
    pub daily_budget_usd: f64,
    /// Monthly budget in USD (0 disables the gate)
    pub monthly_budget_usd: f64,
    /// Last-resort model when selection comes up empty
    pub fallback_model_id: Option<String>,
    /// Model used by the Tier-2 classifier
    pub router_model_id: Option<String>,
    /// Model that `route_self` rules resolve to
    pub self_model_id: Option<String>,
}

impl Policy {
    /// Parse the preferred location order, skipping unknown entries
    pub fn location_preference(&self) -> Vec<Location> {
        self.preferred_locations
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }
}

/// Budget accumulation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SpendPeriod {
    /// Keyed by ISO date
    Daily,
    /// Keyed by year-month
    Monthly,
}

/// Accumulated spend for one period
#[derive(Debug, Clone)]
pub struct SpendRow {
    /// Daily or monthly
    pub period_type: SpendPeriod,
    /// `YYYY-MM-DD` or `YYYY-MM`
    pub period_key: String,
    /// Total spend in USD
    pub total_spend_usd: f64,
    /// Accumulated input tokens
    pub input_tokens: i64,
    /// Accumulated output tokens
    pub output_tokens: i64,
    /// Number of priced requests
    pub request_count: i64,
}

/// One health-probe outcome, appended per probe
#[derive(Debug, Clone)]
pub struct HealthPoint {
    /// Probed model
    pub model_id: String,
    /// Unix seconds of the probe
    pub timestamp: i64,
    /// Probe outcome
    pub is_healthy: bool,
    /// Measured latency on success
    pub latency_ms: Option<f64>,
    /// Error string on failure
    pub error: Option<String>,
    /// Failures since the last success; 0 on success
    pub consecutive_failures: i64,
}

/// One completed request
#[derive(Debug, Clone)]
pub struct RequestLogRow {
    /// Row id (UUID)
    pub id: String,
    /// Unix seconds at completion
    pub timestamp: i64,
    /// Routing tier that produced the decision (1..=3)
    pub tier: i64,
    /// Matched rule, when Tier-1 participated
    pub rule_id: Option<i64>,
    /// Classification JSON, when Tier-2 participated
    pub classification: Option<String>,
    /// Model that actually served the request
    pub selected_model: String,
    /// Prompt tokens reported by the backend
    pub input_tokens: i64,
    /// Completion tokens reported by the backend
    pub output_tokens: i64,
    /// Cost attributed to the serving model
    pub cost_usd: f64,
    /// Wall-clock latency of the whole request
    pub latency_ms: i64,
    /// Whether the stream completed without error
    pub success: bool,
    /// Short text preview for debugging, never exposed in aggregates
    pub preview: Option<String>,
}

/// Enabled-model health summary for the liveness endpoint
#[derive(Debug, Clone, Copy)]
pub struct ModelHealthCounts {
    /// Enabled models
    pub total: i64,
    /// Enabled and healthy
    pub healthy: i64,
    /// Enabled and unhealthy
    pub unhealthy: i64,
}
