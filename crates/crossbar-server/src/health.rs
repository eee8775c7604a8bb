use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use crossbar_llm::GatewayState;
use http::StatusCode;

/// Handle `GET /health`
///
/// 200 when the store is reachable and at least one enabled model is
/// healthy; 503 otherwise. Always reports the budget position.
pub async fn health_handler(State(state): State<GatewayState>) -> Response {
    let database_ok = state.store().ping().await.is_ok();

    let counts = if database_ok {
        state.store().model_health_counts().await.ok()
    } else {
        None
    };

    let budget = if database_ok {
        match state.store().load_policy().await {
            Ok(policy) => state.ledger().status(&policy).await.ok(),
            Err(_) => None,
        }
    } else {
        None
    };

    let healthy_models = counts.map_or(0, |c| c.healthy);
    let status_ok = database_ok && healthy_models > 0;

    let body = serde_json::json!({
        "status": if status_ok { "ok" } else { "degraded" },
        "database": if database_ok { "ok" } else { "error" },
        "models": {
            "total": counts.map_or(0, |c| c.total),
            "healthy": healthy_models,
            "unhealthy": counts.map_or(0, |c| c.unhealthy),
        },
        "budget": {
            "daily_spend": budget.map_or(0.0, |b| b.daily_spend),
            "daily_limit": budget.map_or(0.0, |b| b.daily_limit),
            "monthly_spend": budget.map_or(0.0, |b| b.monthly_spend),
            "monthly_limit": budget.map_or(0.0, |b| b.monthly_limit),
        },
    });

    let status = if status_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}
