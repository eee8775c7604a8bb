use crossbar_store::StoreError;
use thiserror::Error;

/// Errors from the routing engine
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Every tier came up empty, or a rule rejected the request
    #[error("no available model")]
    NoAvailableModel,

    /// A registry read failed; fatal to the current request
    #[error(transparent)]
    Store(#[from] StoreError),
}
