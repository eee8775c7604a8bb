//! Typed access to the registry database
//!
//! Reads are fatal to the calling request when they fail; writes to the
//! request log and ledger are treated as non-fatal by callers.

use std::path::Path;
use std::str::FromStr;

use rusqlite::params;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::schema;
use crate::types::{
    HealthPoint, ModelHealthCounts, ModelRecord, Policy, RequestLogRow, RoutingRule, SpendPeriod,
    SpendRow,
};

/// Errors from the registry store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),

    /// The singleton policy row is missing
    #[error("routing policy row not found")]
    MissingPolicy,
}

/// Column list shared by every model query
const MODEL_COLUMNS: &str = "m.id, m.display_name, m.provider, m.location, m.endpoint,
     m.wire_format, m.api_key_env, m.quality_score, m.context_window,
     m.max_output_tokens, m.supports_tools, m.supports_vision,
     m.supports_reasoning, m.price_in_per_mtok, m.price_out_per_mtok,
     m.price_cache_read_per_mtok, m.price_cache_write_per_mtok,
     m.latency_p50_ms, m.latency_p95_ms, m.hardware, m.enabled,
     m.is_healthy, m.last_health_check, m.last_used_at";

/// Cloneable handle to the registry database
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the registry database at the given path
    ///
    /// Applies pending migrations and enables WAL + foreign keys.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or a migration fails.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    /// Open an in-memory database (tests)
    ///
    /// # Errors
    ///
    /// Returns an error when schema initialization fails.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL;
                     PRAGMA foreign_keys=ON;
                     PRAGMA synchronous=NORMAL;
                     PRAGMA busy_timeout=5000;",
                )?;
                schema::apply_migrations(conn)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Cheap reachability check for the liveness endpoint
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    // -- Models --

    /// Fetch a single model by id
    pub async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        let id = id.to_owned();
        self.conn
            .call(move |conn| {
                let sql = format!("SELECT {MODEL_COLUMNS} FROM models m WHERE m.id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_model(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    /// All enabled models, ordered by location then quality descending
    pub async fn list_enabled_models(&self) -> Result<Vec<ModelRecord>, StoreError> {
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {MODEL_COLUMNS} FROM models m
                     WHERE m.enabled = 1
                     ORDER BY CASE m.location
                         WHEN 'colocated' THEN 0
                         WHEN 'lan' THEN 1
                         ELSE 2
                     END, m.quality_score DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_model(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(Into::into)
    }

    /// Enabled, healthy models; optionally restricted to a capability
    pub async fn list_enabled_healthy_models(
        &self,
        capability: Option<&str>,
    ) -> Result<Vec<ModelRecord>, StoreError> {
        let capability = capability.map(ToOwned::to_owned);
        self.conn
            .call(move |conn| {
                let mut out = Vec::new();
                if let Some(capability) = capability {
                    let sql = format!(
                        "SELECT {MODEL_COLUMNS} FROM models m
                         INNER JOIN model_capabilities c ON c.model_id = m.id
                         WHERE m.enabled = 1 AND m.is_healthy = 1
                           AND c.capability = ?1"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut rows = stmt.query(params![capability])?;
                    while let Some(row) = rows.next()? {
                        out.push(row_to_model(row)?);
                    }
                } else {
                    let sql = format!(
                        "SELECT {MODEL_COLUMNS} FROM models m
                         WHERE m.enabled = 1 AND m.is_healthy = 1"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        out.push(row_to_model(row)?);
                    }
                }
                Ok(out)
            })
            .await
            .map_err(Into::into)
    }

    /// Health summary over enabled models
    pub async fn model_health_counts(&self) -> Result<ModelHealthCounts, StoreError> {
        self.conn
            .call(|conn| {
                let (total, healthy): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(is_healthy), 0)
                     FROM models WHERE enabled = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(ModelHealthCounts {
                    total,
                    healthy,
                    unhealthy: total - healthy,
                })
            })
            .await
            .map_err(Into::into)
    }

    /// Insert or replace a model row (operator edits, seeding, tests)
    pub async fn upsert_model(&self, model: &ModelRecord) -> Result<(), StoreError> {
        let m = model.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO models (id, display_name, provider, location, endpoint,
                        wire_format, api_key_env, quality_score, context_window,
                        max_output_tokens, supports_tools, supports_vision,
                        supports_reasoning, price_in_per_mtok, price_out_per_mtok,
                        price_cache_read_per_mtok, price_cache_write_per_mtok,
                        latency_p50_ms, latency_p95_ms, hardware, enabled, is_healthy,
                        last_health_check, last_used_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,
                             ?17,?18,?19,?20,?21,?22,?23,?24)
                     ON CONFLICT(id) DO UPDATE SET
                        display_name=excluded.display_name, provider=excluded.provider,
                        location=excluded.location, endpoint=excluded.endpoint,
                        wire_format=excluded.wire_format, api_key_env=excluded.api_key_env,
                        quality_score=excluded.quality_score,
                        context_window=excluded.context_window,
                        max_output_tokens=excluded.max_output_tokens,
                        supports_tools=excluded.supports_tools,
                        supports_vision=excluded.supports_vision,
                        supports_reasoning=excluded.supports_reasoning,
                        price_in_per_mtok=excluded.price_in_per_mtok,
                        price_out_per_mtok=excluded.price_out_per_mtok,
                        price_cache_read_per_mtok=excluded.price_cache_read_per_mtok,
                        price_cache_write_per_mtok=excluded.price_cache_write_per_mtok,
                        latency_p50_ms=excluded.latency_p50_ms,
                        latency_p95_ms=excluded.latency_p95_ms,
                        hardware=excluded.hardware, enabled=excluded.enabled,
                        is_healthy=excluded.is_healthy",
                    params![
                        m.id,
                        m.display_name,
                        m.provider,
                        m.location.to_string(),
                        m.endpoint,
                        m.wire_format.to_string(),
                        m.api_key_env,
                        m.quality_score,
                        m.context_window,
                        m.max_output_tokens,
                        m.supports_tools,
                        m.supports_vision,
                        m.supports_reasoning,
                        m.price_in_per_mtok,
                        m.price_out_per_mtok,
                        m.price_cache_read_per_mtok,
                        m.price_cache_write_per_mtok,
                        m.latency_p50_ms,
                        m.latency_p95_ms,
                        m.hardware,
                        m.enabled,
                        m.healthy,
                        m.last_health_check,
                        m.last_used_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Replace the capability set of a model
    pub async fn set_capabilities(
        &self,
        model_id: &str,
        capabilities: &[&str],
    ) -> Result<(), StoreError> {
        let model_id = model_id.to_owned();
        let capabilities: Vec<String> = capabilities.iter().map(|&c| c.to_owned()).collect();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM model_capabilities WHERE model_id = ?1",
                    params![model_id],
                )?;
                for capability in &capabilities {
                    tx.execute(
                        "INSERT INTO model_capabilities (model_id, capability) VALUES (?1, ?2)",
                        params![model_id, capability],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Set the derived health flag and refresh the probe timestamp
    pub async fn mark_model_health(
        &self,
        model_id: &str,
        healthy: bool,
        now: i64,
    ) -> Result<(), StoreError> {
        let model_id = model_id.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE models SET is_healthy = ?2, last_health_check = ?3 WHERE id = ?1",
                    params![model_id, healthy, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Refresh the probe timestamp without changing the health flag
    pub async fn touch_health_check(&self, model_id: &str, now: i64) -> Result<(), StoreError> {
        let model_id = model_id.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE models SET last_health_check = ?2 WHERE id = ?1",
                    params![model_id, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Record that a model just served a request
    pub async fn touch_last_used(&self, model_id: &str, now: i64) -> Result<(), StoreError> {
        let model_id = model_id.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE models SET last_used_at = ?2 WHERE id = ?1",
                    params![model_id, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    // -- Policy and rules --

    /// Load the singleton routing policy
    pub async fn load_policy(&self) -> Result<Policy, StoreError> {
        let policy = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT min_quality_score, max_cost_per_million, max_latency_ms,
                            preferred_locations, quality_tolerance, daily_budget_usd,
                            monthly_budget_usd, fallback_model_id, router_model_id,
                            self_model_id
                     FROM routing_policy WHERE id = 1",
                )?;
                let mut rows = stmt.query([])?;
                match rows.next()? {
                    Some(row) => Ok(Some(Policy {
                        min_quality_score: row.get(0)?,
                        max_cost_per_million: row.get(1)?,
                        max_latency_ms: row.get(2)?,
                        preferred_locations: row.get(3)?,
                        quality_tolerance: row.get(4)?,
                        daily_budget_usd: row.get(5)?,
                        monthly_budget_usd: row.get(6)?,
                        fallback_model_id: row.get(7)?,
                        router_model_id: row.get(8)?,
                        self_model_id: row.get(9)?,
                    })),
                    None => Ok(None),
                }
            })
            .await?;
        policy.ok_or(StoreError::MissingPolicy)
    }

    /// Overwrite the singleton routing policy
    pub async fn update_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        let p = policy.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE routing_policy SET
                        min_quality_score = ?1, max_cost_per_million = ?2,
                        max_latency_ms = ?3, preferred_locations = ?4,
                        quality_tolerance = ?5, daily_budget_usd = ?6,
                        monthly_budget_usd = ?7, fallback_model_id = ?8,
                        router_model_id = ?9, self_model_id = ?10
                     WHERE id = 1",
                    params![
                        p.min_quality_score,
                        p.max_cost_per_million,
                        p.max_latency_ms,
                        p.preferred_locations,
                        p.quality_tolerance,
                        p.daily_budget_usd,
                        p.monthly_budget_usd,
                        p.fallback_model_id,
                        p.router_model_id,
                        p.self_model_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// All enabled rules, ascending priority
    pub async fn load_rules(&self) -> Result<Vec<RoutingRule>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, priority, source, channel, pattern, token_max,
                            has_media, target_model_id, action, enabled
                     FROM routing_rules WHERE enabled = 1
                     ORDER BY priority ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(RoutingRule {
                        id: row.get(0)?,
                        priority: row.get(1)?,
                        source: row.get(2)?,
                        channel: row.get(3)?,
                        pattern: row.get(4)?,
                        token_max: row.get(5)?,
                        has_media: row.get(6)?,
                        target_model_id: row.get(7)?,
                        action: parse_text_enum(8, &row.get::<_, String>(8)?)?,
                        enabled: row.get(9)?,
                    });
                }
                Ok(out)
            })
            .await
            .map_err(Into::into)
    }

    /// Insert a rule, returning its row id
    pub async fn insert_rule(&self, rule: &RoutingRule) -> Result<i64, StoreError> {
        let r = rule.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO routing_rules (priority, source, channel, pattern,
                        token_max, has_media, target_model_id, action, enabled)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    params![
                        r.priority,
                        r.source,
                        r.channel,
                        r.pattern,
                        r.token_max,
                        r.has_media,
                        r.target_model_id,
                        r.action.to_string(),
                        r.enabled,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    /// Remove all rules (test seeding)
    pub async fn clear_rules(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM routing_rules", [])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    // -- Lookup tables --

    /// Quality floor for a complexity label
    pub async fn quality_floor_for(&self, complexity: &str) -> Result<Option<i64>, StoreError> {
        let complexity = complexity.to_owned();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT quality_floor FROM complexity_floors WHERE complexity = ?1")?;
                let mut rows = stmt.query(params![complexity])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    /// Capability for a task-type label
    pub async fn capability_for(&self, task_type: &str) -> Result<Option<String>, StoreError> {
        let task_type = task_type.to_owned();
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT capability FROM task_capabilities WHERE task_type = ?1")?;
                let mut rows = stmt.query(params![task_type])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    // -- Rate limits --

    /// Mark a provider as rate limited until `retry_after`
    pub async fn mark_provider_limited(
        &self,
        provider: &str,
        now: i64,
        retry_after: i64,
    ) -> Result<(), StoreError> {
        let provider = provider.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO provider_rate_limits (provider, is_limited, limited_since, retry_after)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(provider) DO UPDATE SET
                        is_limited = 1, limited_since = excluded.limited_since,
                        retry_after = excluded.retry_after",
                    params![provider, now, retry_after],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Clear any limit whose `retry_after` has passed
    pub async fn clear_expired_limits(&self, now: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE provider_rate_limits
                     SET is_limited = 0, limited_since = NULL, retry_after = NULL
                     WHERE is_limited = 1 AND retry_after IS NOT NULL AND retry_after < ?1",
                    params![now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Providers currently marked limited
    pub async fn list_rate_limited(&self) -> Result<Vec<String>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT provider FROM provider_rate_limits WHERE is_limited = 1")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get(0)?);
                }
                Ok(out)
            })
            .await
            .map_err(Into::into)
    }

    // -- Budget spend --

    /// Atomically add one priced request to the daily and monthly rows
    pub async fn record_spend(
        &self,
        daily_key: &str,
        monthly_key: &str,
        cost_usd: f64,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<(), StoreError> {
        let daily_key = daily_key.to_owned();
        let monthly_key = monthly_key.to_owned();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (period_type, key) in [("daily", &daily_key), ("monthly", &monthly_key)] {
                    tx.execute(
                        "INSERT INTO budget_spend (period_type, period_key, total_spend_usd,
                            input_tokens, output_tokens, request_count)
                         VALUES (?1, ?2, ?3, ?4, ?5, 1)
                         ON CONFLICT(period_type, period_key) DO UPDATE SET
                            total_spend_usd = total_spend_usd + excluded.total_spend_usd,
                            input_tokens = input_tokens + excluded.input_tokens,
                            output_tokens = output_tokens + excluded.output_tokens,
                            request_count = request_count + 1",
                        params![period_type, key, cost_usd, input_tokens, output_tokens],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Accumulated spend for one period key
    pub async fn get_spend(
        &self,
        period: SpendPeriod,
        period_key: &str,
    ) -> Result<Option<SpendRow>, StoreError> {
        let period_key = period_key.to_owned();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT total_spend_usd, input_tokens, output_tokens, request_count
                     FROM budget_spend WHERE period_type = ?1 AND period_key = ?2",
                )?;
                let mut rows = stmt.query(params![period.to_string(), period_key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(SpendRow {
                        period_type: period,
                        period_key,
                        total_spend_usd: row.get(0)?,
                        input_tokens: row.get(1)?,
                        output_tokens: row.get(2)?,
                        request_count: row.get(3)?,
                    })),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    // -- Health log --

    /// Append one probe outcome
    pub async fn append_health_log(&self, point: &HealthPoint) -> Result<(), StoreError> {
        let p = point.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO health_log (model_id, timestamp, is_healthy, latency_ms,
                        error, consecutive_failures)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    params![
                        p.model_id,
                        p.timestamp,
                        p.is_healthy,
                        p.latency_ms,
                        p.error,
                        p.consecutive_failures,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Failure counter from the most recent log row, 0 when none
    pub async fn last_consecutive_failures(&self, model_id: &str) -> Result<i64, StoreError> {
        let model_id = model_id.to_owned();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT consecutive_failures FROM health_log
                     WHERE model_id = ?1 ORDER BY id DESC LIMIT 1",
                )?;
                let mut rows = stmt.query(params![model_id])?;
                match rows.next()? {
                    Some(row) => Ok(row.get(0)?),
                    None => Ok(0),
                }
            })
            .await
            .map_err(Into::into)
    }

    /// Delete health rows older than the cutoff, returning the count
    pub async fn prune_health_logs(&self, cutoff: i64) -> Result<usize, StoreError> {
        self.conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM health_log WHERE timestamp < ?1", params![cutoff])?;
                Ok(n)
            })
            .await
            .map_err(Into::into)
    }

    // -- Request log --

    /// Insert one completed-request row
    pub async fn insert_request_log(&self, row: &RequestLogRow) -> Result<(), StoreError> {
        let r = row.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO request_log (id, timestamp, tier, rule_id, classification,
                        selected_model, input_tokens, output_tokens, cost_usd, latency_ms,
                        success, preview)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                    params![
                        r.id,
                        r.timestamp,
                        r.tier,
                        r.rule_id,
                        r.classification,
                        r.selected_model,
                        r.input_tokens,
                        r.output_tokens,
                        r.cost_usd,
                        r.latency_ms,
                        r.success,
                        r.preview,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Most recent request rows, newest first
    pub async fn list_request_logs(&self, limit: i64) -> Result<Vec<RequestLogRow>, StoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, tier, rule_id, classification, selected_model,
                            input_tokens, output_tokens, cost_usd, latency_ms, success,
                            preview
                     FROM request_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )?;
                let mut rows = stmt.query(params![limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(RequestLogRow {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        tier: row.get(2)?,
                        rule_id: row.get(3)?,
                        classification: row.get(4)?,
                        selected_model: row.get(5)?,
                        input_tokens: row.get(6)?,
                        output_tokens: row.get(7)?,
                        cost_usd: row.get(8)?,
                        latency_ms: row.get(9)?,
                        success: row.get(10)?,
                        preview: row.get(11)?,
                    });
                }
                Ok(out)
            })
            .await
            .map_err(Into::into)
    }

    /// Delete request rows older than the cutoff, returning the count
    pub async fn prune_request_logs(&self, cutoff: i64) -> Result<usize, StoreError> {
        self.conn
            .call(move |conn| {
                let n =
                    conn.execute("DELETE FROM request_log WHERE timestamp < ?1", params![cutoff])?;
                Ok(n)
            })
            .await
            .map_err(Into::into)
    }
}

/// Map a text column to a strum-parsed enum, surfacing bad values as
/// conversion failures instead of panicking
fn parse_text_enum<T>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    raw.parse().map_err(|e: strum::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelRecord> {
    Ok(ModelRecord {
        id: row.get(0)?,
        display_name: row.get(1)?,
        provider: row.get(2)?,
        location: parse_text_enum(3, &row.get::<_, String>(3)?)?,
        endpoint: row.get(4)?,
        wire_format: parse_text_enum(5, &row.get::<_, String>(5)?)?,
        api_key_env: row.get(6)?,
        quality_score: row.get(7)?,
        context_window: row.get(8)?,
        max_output_tokens: row.get(9)?,
        supports_tools: row.get(10)?,
        supports_vision: row.get(11)?,
        supports_reasoning: row.get(12)?,
        price_in_per_mtok: row.get(13)?,
        price_out_per_mtok: row.get(14)?,
        price_cache_read_per_mtok: row.get(15)?,
        price_cache_write_per_mtok: row.get(16)?,
        latency_p50_ms: row.get(17)?,
        latency_p95_ms: row.get(18)?,
        hardware: row.get(19)?,
        enabled: row.get(20)?,
        healthy: row.get(21)?,
        last_health_check: row.get(22)?,
        last_used_at: row.get(23)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, RuleAction, WireFormat};

    fn test_model(id: &str, location: Location, quality: i64) -> ModelRecord {
        ModelRecord {
            id: id.to_owned(),
            display_name: id.to_owned(),
            provider: id.split('/').next().unwrap_or("test").to_owned(),
            location,
            endpoint: "http://127.0.0.1:9000/v1".to_owned(),
            wire_format: WireFormat::Openai,
            api_key_env: None,
            quality_score: quality,
            context_window: 32_768,
            max_output_tokens: 2048,
            supports_tools: false,
            supports_vision: false,
            supports_reasoning: false,
            price_in_per_mtok: 0.0,
            price_out_per_mtok: 0.0,
            price_cache_read_per_mtok: 0.0,
            price_cache_write_per_mtok: 0.0,
            latency_p50_ms: None,
            latency_p95_ms: None,
            hardware: None,
            enabled: true,
            healthy: true,
            last_health_check: None,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn migrations_seed_policy_and_lookups() {
        let store = Store::open_in_memory().await.unwrap();

        let policy = store.load_policy().await.unwrap();
        assert_eq!(policy.quality_tolerance, 15);

        assert_eq!(store.quality_floor_for("simple").await.unwrap(), Some(0));
        assert_eq!(store.quality_floor_for("complex").await.unwrap(), Some(65));
        assert_eq!(
            store.capability_for("reasoning").await.unwrap().as_deref(),
            Some("complex_logic")
        );
        assert_eq!(store.capability_for("nonsense").await.unwrap(), None);
    }

    #[tokio::test]
    async fn seeded_rules_are_priority_ordered() {
        let store = Store::open_in_memory().await.unwrap();
        let rules = store.load_rules().await.unwrap();
        assert!(!rules.is_empty());
        assert!(rules.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert_eq!(rules[0].source.as_deref(), Some("heartbeat"));
        assert_eq!(rules[0].action, RuleAction::RouteSelf);
    }

    #[tokio::test]
    async fn model_roundtrip_and_capability_join() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_model(&test_model("lan/coder", Location::Lan, 70))
            .await
            .unwrap();
        store
            .set_capabilities("lan/coder", &["coding", "tool_calling"])
            .await
            .unwrap();

        let fetched = store.get_model("lan/coder").await.unwrap().unwrap();
        assert_eq!(fetched.location, Location::Lan);
        assert_eq!(fetched.quality_score, 70);

        let coders = store
            .list_enabled_healthy_models(Some("coding"))
            .await
            .unwrap();
        assert!(coders.iter().any(|m| m.id == "lan/coder"));

        let writers = store
            .list_enabled_healthy_models(Some("writing"))
            .await
            .unwrap();
        assert!(!writers.iter().any(|m| m.id == "lan/coder"));
    }

    #[tokio::test]
    async fn spend_upsert_accumulates_atomically() {
        let store = Store::open_in_memory().await.unwrap();
        for _ in 0..3 {
            store
                .record_spend("2026-08-01", "2026-08", 0.5, 1000, 200)
                .await
                .unwrap();
        }

        let daily = store
            .get_spend(SpendPeriod::Daily, "2026-08-01")
            .await
            .unwrap()
            .unwrap();
        assert!((daily.total_spend_usd - 1.5).abs() < 1e-9);
        assert_eq!(daily.request_count, 3);
        assert_eq!(daily.input_tokens, 3000);

        let monthly = store
            .get_spend(SpendPeriod::Monthly, "2026-08")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monthly.request_count, 3);
    }

    #[tokio::test]
    async fn expired_rate_limits_are_cleared() {
        let store = Store::open_in_memory().await.unwrap();
        store.mark_provider_limited("anthropic", 100, 160).await.unwrap();
        assert_eq!(store.list_rate_limited().await.unwrap(), vec!["anthropic"]);

        // Still inside the window
        store.clear_expired_limits(150).await.unwrap();
        assert_eq!(store.list_rate_limited().await.unwrap(), vec!["anthropic"]);

        // Past retry_after
        store.clear_expired_limits(161).await.unwrap();
        assert!(store.list_rate_limited().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_log_counter_tracks_latest_row() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_model(&test_model("local/m", Location::Colocated, 40))
            .await
            .unwrap();

        assert_eq!(store.last_consecutive_failures("local/m").await.unwrap(), 0);

        for n in 1..=2 {
            store
                .append_health_log(&HealthPoint {
                    model_id: "local/m".to_owned(),
                    timestamp: 1000 + n,
                    is_healthy: false,
                    latency_ms: None,
                    error: Some("connect refused".to_owned()),
                    consecutive_failures: n,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.last_consecutive_failures("local/m").await.unwrap(), 2);

        store
            .append_health_log(&HealthPoint {
                model_id: "local/m".to_owned(),
                timestamp: 1003,
                is_healthy: true,
                latency_ms: Some(12.0),
                error: None,
                consecutive_failures: 0,
            })
            .await
            .unwrap();
        assert_eq!(store.last_consecutive_failures("local/m").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_drops_only_old_rows() {
        let store = Store::open_in_memory().await.unwrap();
        for (ts, n) in [(100, 1), (200, 2)] {
            store
                .append_health_log(&HealthPoint {
                    model_id: "local/m".to_owned(),
                    timestamp: ts,
                    is_healthy: true,
                    latency_ms: None,
                    error: None,
                    consecutive_failures: n,
                })
                .await
                .unwrap();
        }
        let removed = store.prune_health_logs(150).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.last_consecutive_failures("local/m").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn request_log_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_request_log(&RequestLogRow {
                id: "req-1".to_owned(),
                timestamp: 1234,
                tier: 2,
                rule_id: None,
                classification: Some(r#"{"complexity":"medium"}"#.to_owned()),
                selected_model: "lan/coder".to_owned(),
                input_tokens: 10,
                output_tokens: 5,
                cost_usd: 0.0,
                latency_ms: 42,
                success: true,
                preview: Some("hello".to_owned()),
            })
            .await
            .unwrap();

        let rows = store.list_request_logs(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].selected_model, "lan/coder");
        assert!(rows[0].success);
    }
}
