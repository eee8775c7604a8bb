//! Backend adapters, retrying dispatch, and the completion surface
//!
//! Every backend, whatever its wire format, is normalized to a stream of
//! OpenAI-shaped chunks. The dispatcher walks the ranked candidate list,
//! classifying failures into persistent health and rate-limit state, and
//! the axum handlers stream the winning backend to the client.

#![allow(clippy::must_use_candidate)]

pub mod adapter;
pub mod dispatch;
mod error;
pub mod health;
pub mod protocol;
pub mod router;
pub mod types;

pub use dispatch::Dispatcher;
pub use error::{BackendError, FailureKind, GatewayError};
pub use health::{HealthMonitor, RetentionSweeper};
pub use router::{GatewayState, llm_router};
