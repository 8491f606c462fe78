//! Error taxonomy for operator-initiated grid operations.
use thiserror::Error;

use crate::model::ActionKind;

/// Every variant is terminal for the operation that produced it; nothing here is retried.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Error fetching products: {0:#}")]
    Fetch(anyhow::Error),
    #[error("{0}")]
    Validation(String),
    #[error("merge pre-check failed: {0:#}")]
    Preflight(anyhow::Error),
    #[error("{} already in progress", .0.label())]
    ActionInFlight(ActionKind),
    #[error("failed to submit {0} batch: {1:#}")]
    Submit(ActionKind, anyhow::Error),
    #[error("progress channel {0}: {1:#}")]
    Channel(String, anyhow::Error),
    #[error("navigation failed: {0:#}")]
    Navigation(anyhow::Error),
    #[error("controls are frozen while a request is in flight")]
    Busy,
}

impl GridError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GridError::Validation(msg.into())
    }

    /// Informational errors are shown without blocking the operator.
    pub fn is_informational(&self) -> bool {
        matches!(self, GridError::ActionInFlight(_) | GridError::Busy)
    }
}
