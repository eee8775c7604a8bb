//! Retrying dispatcher
//!
//! Walks the ranked candidate list in order, never in parallel and never
//! retrying the same model. Each failure is classified and folded into
//! persistent health or rate-limit state before the next candidate is
//! tried; the classification table is the error taxonomy's contract.

use crossbar_routing::RankedCandidate;
use crossbar_store::{HealthPoint, ModelRecord, Store, StoreError, UNHEALTHY_THRESHOLD};
use jiff::Timestamp;

use crate::adapter::{Adapters, StreamResponse};
use crate::error::{BackendError, FailureKind, GatewayError};
use crate::types::ChatRequest;

/// How long a 429 parks a provider
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Dispatches a request across ranked candidates
pub struct Dispatcher {
    store: Store,
    adapters: Adapters,
}

impl Dispatcher {
    /// Create over the registry and the fixed adapter set
    pub const fn new(store: Store, adapters: Adapters) -> Self {
        Self { store, adapters }
    }

    /// Try each candidate in rank order until one opens a stream
    ///
    /// # Errors
    ///
    /// `GatewayError::NoAvailableModel` when every candidate fails.
    pub async fn dispatch(
        &self,
        candidates: &[RankedCandidate],
        request: &ChatRequest,
    ) -> Result<StreamResponse, GatewayError> {
        for candidate in candidates {
            let model = &candidate.model;
            let adapter = self.adapters.for_model(model);

            match adapter.send(model, request).await {
                Ok(stream) => {
                    if candidate.rank > 1 {
                        tracing::info!(
                            model = %model.id,
                            rank = candidate.rank,
                            "request served by a lower-ranked candidate"
                        );
                    }
                    if let Err(e) = self
                        .store
                        .touch_last_used(&model.id, Timestamp::now().as_second())
                        .await
                    {
                        tracing::warn!(error = %e, "failed to update last_used_at");
                    }
                    return Ok(StreamResponse {
                        model: model.clone(),
                        stream,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        model = %model.id,
                        rank = candidate.rank,
                        adapter = adapter.name(),
                        error = %error,
                        "candidate dispatch failed"
                    );
                    self.note_failure(model, &error).await;
                }
            }
        }

        Err(GatewayError::NoAvailableModel)
    }

    /// Fold one failure into persistent state
    ///
    /// State updates are best-effort: a broken registry must not stop the
    /// walk to the next candidate.
    async fn note_failure(&self, model: &ModelRecord, error: &BackendError) {
        let now = Timestamp::now().as_second();

        let result = match error.failure_kind() {
            FailureKind::RateLimited => {
                self.store
                    .mark_provider_limited(&model.provider, now, now + RATE_LIMIT_WINDOW_SECS)
                    .await
            }
            FailureKind::ServerError => self.record_server_error(model, error, now).await,
            FailureKind::ConnectionFailed => {
                self.store.mark_model_health(&model.id, false, now).await
            }
            FailureKind::Other => return,
        };

        if let Err(e) = result {
            tracing::warn!(model = %model.id, error = %e, "failed to persist failure state");
        }
    }

    /// 5xx path: a failed health row that may trip the threshold
    async fn record_server_error(
        &self,
        model: &ModelRecord,
        error: &BackendError,
        now: i64,
    ) -> Result<(), StoreError> {
        let failures = self.store.last_consecutive_failures(&model.id).await? + 1;

        self.store
            .append_health_log(&HealthPoint {
                model_id: model.id.clone(),
                timestamp: now,
                is_healthy: false,
                latency_ms: None,
                error: Some(error.to_string()),
                consecutive_failures: failures,
            })
            .await?;

        if failures >= UNHEALTHY_THRESHOLD {
            self.store.mark_model_health(&model.id, false, now).await?;
        }
        Ok(())
    }
}
