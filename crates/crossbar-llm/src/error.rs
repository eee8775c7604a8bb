use crossbar_core::HttpError;
use crossbar_store::StoreError;
use http::StatusCode;
use thiserror::Error;

/// Errors raised by a backend adapter
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend answered with a non-2xx status
    #[error("backend returned {status}: {body}")]
    Upstream {
        /// HTTP status from the backend
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The request never completed (connect, timeout, TLS, ...)
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model names a credential env var that is unset or empty
    #[error("no credential available for {model}")]
    MissingCredential {
        /// Model whose credential is missing
        model: String,
    },

    /// The response stream broke mid-flight
    #[error("stream error: {0}")]
    Streaming(String),
}

/// How the dispatcher treats a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider-scoped 429; park the provider for the rate-limit window
    RateLimited,
    /// 5xx; counts toward the consecutive-failure threshold
    ServerError,
    /// Timeout or connection failure; flips the model unhealthy directly
    ConnectionFailed,
    /// Anything else; no persistent state change
    Other,
}

impl BackendError {
    /// Classify this failure for the dispatcher's state updates
    ///
    /// Status codes are checked first, then the message substrings the
    /// taxonomy names; the tests are intentionally inclusive.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Upstream { status: 429, .. } => FailureKind::RateLimited,
            Self::Upstream { status, .. } if (500..600).contains(status) => {
                FailureKind::ServerError
            }
            Self::Request(e) if e.is_timeout() || e.is_connect() => FailureKind::ConnectionFailed,
            other => {
                let message = other.to_string().to_lowercase();
                if message.contains("429") || message.contains("rate limit") {
                    FailureKind::RateLimited
                } else if message.contains("timeout") || message.contains("connection refused") {
                    FailureKind::ConnectionFailed
                } else {
                    FailureKind::Other
                }
            }
        }
    }
}

/// Request-level errors surfaced to API consumers
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request body failed validation
    #[error("{0}")]
    Validation(String),

    /// Bearer authentication required and missing or wrong
    #[error("authentication required")]
    Unauthorized,

    /// Routing or dispatch found no model able to serve the request
    #[error("no available model")]
    NoAvailableModel,

    /// The backend produced zero chunks
    #[error("backend returned an empty response")]
    EmptyBackendResponse,

    /// A registry read failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoAvailableModel => StatusCode::SERVICE_UNAVAILABLE,
            Self::EmptyBackendResponse => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "invalid_request_error",
            Self::Unauthorized => "authentication_error",
            Self::NoAvailableModel | Self::EmptyBackendResponse | Self::Store(_) => "server_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Store(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
