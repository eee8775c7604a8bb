use axum::Json;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use secrecy::{ExposeSecret, SecretString};

/// Require the configured bearer key on every endpoint except liveness
pub async fn auth_middleware(api_key: &SecretString, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == api_key.expose_secret() => next.run(request).await,
        _ => {
            tracing::debug!(path = request.uri().path(), "rejecting unauthenticated request");
            let body = serde_json::json!({
                "error": {
                    "message": "authentication required",
                    "type": "authentication_error"
                }
            });
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
    }
}
