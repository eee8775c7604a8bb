#![allow(clippy::must_use_candidate)]

mod env;

pub use env::{ConfigError, GatewayConfig};
