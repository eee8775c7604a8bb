//! Health monitor and retention loops
//!
//! The monitor probes every enabled endpoint on a fixed interval with a
//! short GET; consecutive failures are tracked in the health log and the
//! derived flag flips at the threshold. A slower daily sweep trims the
//! health and request logs.

use std::time::{Duration, Instant};

use crossbar_store::{HealthPoint, ModelRecord, Store, UNHEALTHY_THRESHOLD};
use jiff::Timestamp;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Per-probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long health rows are kept
const HEALTH_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long request rows are kept
const REQUEST_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Retention sweep cadence
const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Periodic liveness prober for the whole fleet
pub struct HealthMonitor {
    store: Store,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor probing on the given interval
    pub fn new(store: Store, interval: Duration) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            interval,
        }
    }

    /// Run until cancelled
    ///
    /// A round is awaited inline, so a stalled round causes ticks to be
    /// skipped rather than queued.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.probe_round().await,
            }
        }

        tracing::debug!("health monitor stopped");
    }

    /// Probe every enabled model concurrently
    pub async fn probe_round(&self) {
        let models = match self.store.list_enabled_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, "health round skipped, model list unavailable");
                return;
            }
        };

        futures_util::future::join_all(models.iter().map(|m| self.probe_one(m))).await;
    }

    /// Probe a single endpoint and fold the outcome into the log
    async fn probe_one(&self, model: &ModelRecord) {
        let url = format!("{}/models", model.endpoint.trim_end_matches('/'));
        let started = Instant::now();

        let outcome = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        let now = Timestamp::now().as_second();

        match outcome {
            Ok(response) if response.status().is_success() => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.record_success(model, latency_ms, now).await;
            }
            Ok(response) => {
                self.record_failure(model, format!("probe returned {}", response.status()), now)
                    .await;
            }
            Err(e) => self.record_failure(model, e.to_string(), now).await,
        }
    }

    async fn record_success(&self, model: &ModelRecord, latency_ms: f64, now: i64) {
        let point = HealthPoint {
            model_id: model.id.clone(),
            timestamp: now,
            is_healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
            consecutive_failures: 0,
        };

        if let Err(e) = self.store.append_health_log(&point).await {
            tracing::warn!(model = %model.id, error = %e, "failed to append health row");
        }
        if let Err(e) = self.store.mark_model_health(&model.id, true, now).await {
            tracing::warn!(model = %model.id, error = %e, "failed to mark model healthy");
        }
    }

    async fn record_failure(&self, model: &ModelRecord, error: String, now: i64) {
        let failures = match self.store.last_consecutive_failures(&model.id).await {
            Ok(prev) => prev + 1,
            Err(e) => {
                tracing::warn!(model = %model.id, error = %e, "failed to read failure counter");
                return;
            }
        };

        tracing::warn!(
            model = %model.id,
            consecutive_failures = failures,
            error = %error,
            "health probe failed"
        );

        let point = HealthPoint {
            model_id: model.id.clone(),
            timestamp: now,
            is_healthy: false,
            latency_ms: None,
            error: Some(error),
            consecutive_failures: failures,
        };
        if let Err(e) = self.store.append_health_log(&point).await {
            tracing::warn!(model = %model.id, error = %e, "failed to append health row");
        }

        let result = if failures >= UNHEALTHY_THRESHOLD {
            self.store.mark_model_health(&model.id, false, now).await
        } else {
            self.store.touch_health_check(&model.id, now).await
        };
        if let Err(e) = result {
            tracing::warn!(model = %model.id, error = %e, "failed to update model health");
        }
    }
}

/// Daily retention sweep over the health and request logs
pub struct RetentionSweeper {
    store: Store,
}

impl RetentionSweeper {
    /// Create a sweeper over the registry
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run until cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    /// Trim both logs once
    pub async fn sweep(&self) {
        let now = Timestamp::now().as_second();

        match self
            .store
            .prune_health_logs(now - HEALTH_RETENTION.as_secs() as i64)
            .await
        {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "pruned health log");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "health log prune failed"),
        }

        match self
            .store
            .prune_request_logs(now - REQUEST_RETENTION.as_secs() as i64)
            .await
        {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "pruned request log");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "request log prune failed"),
        }
    }
}
