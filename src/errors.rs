//! Shared error type for DOM automation.
//!
//! Every interaction layer (locating, injecting, submitting, waiting)
//! reports failures through [`AutomationError`] so adapters and the
//! client can branch on the failure class instead of parsing strings.

use thiserror::Error;

use crate::browser::BrowserRuntimeError;
use crate::service::Service;

/// Failure classes produced while driving a chat page.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// No selector tier produced a visible element for the given role.
    #[error("no visible {role} element on {service}")]
    NotFound {
        service: Service,
        role: &'static str,
    },

    /// A bounded wait ran out before its condition held.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    /// Every strategy in a cascade was attempted and none succeeded.
    #[error("all {attempted} {operation} strategies failed")]
    AllStrategiesExhausted {
        operation: &'static str,
        attempted: usize,
    },

    /// The page is in a state that forbids the operation right now.
    #[error("conflicting page state: {0}")]
    StateConflict(String),

    /// In-page script evaluation failed or returned malformed data.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// A probe returned JSON that does not match the expected shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The underlying browser runtime refused or lost the connection.
    #[error(transparent)]
    Runtime(#[from] BrowserRuntimeError),
}

impl AutomationError {
    /// True when retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::Timeout { .. } | AutomationError::StateConflict(_)
        )
    }

    /// Short machine-friendly tag used in log records and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationError::NotFound { .. } => "not-found",
            AutomationError::Timeout { .. } => "timeout",
            AutomationError::AllStrategiesExhausted { .. } => "strategies-exhausted",
            AutomationError::StateConflict(_) => "state-conflict",
            AutomationError::Script(_) => "script",
            AutomationError::Json(_) => "json",
            AutomationError::Runtime(_) => "runtime",
        }
    }
}
