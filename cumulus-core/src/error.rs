//! Error types shared by the lifecycle orchestrator and provider adapters

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timeouts::{Verb, format_duration};

/// Error returned by a remote service call
///
/// Mirrors the shape of errors produced by the generated SDK: an HTTP status
/// code, a service-specific error code and a human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error(
    "Service error:{code}. {message}. http status code: {status_code}. Opc request id: {}",
    .request_id.as_deref().unwrap_or("none")
)]
pub struct ServiceError {
    pub status_code: u16,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ServiceError {
    pub fn new(status_code: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// 404 NotAuthorizedOrNotFound, as returned for an unknown identifier
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NotAuthorizedOrNotFound", message)
    }

    /// 409 Conflict, as returned while a resource is busy with another operation
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, "Conflict", message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(400, "InvalidParameter", message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Errors produced while driving a resource through its lifecycle
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The remote call itself failed; propagated verbatim
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The poll gave up before a target state was reached
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {}), resource id: {identifier}",
        .expected.join(", "),
        format_duration(.timeout)
    )]
    Timeout {
        identifier: String,
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
    },

    /// The resource reported a label that is neither pending nor target
    #[error(
        "unexpected state '{state}', wanted target '{}', resource id: {identifier}",
        .expected.join(", ")
    )]
    UnexpectedState {
        identifier: String,
        state: String,
        expected: Vec<String>,
    },

    /// The resource stayed invisible for longer than the poller tolerates
    #[error("couldn't find resource {identifier} ({checks} retries)")]
    NotFound { identifier: String, checks: u32 },

    /// The control plane reported the terminal FAILED state
    #[error("resource {identifier} {} failed, state FAILED{}", .verb.operation_name(), detail(.message))]
    Failed {
        identifier: String,
        verb: Verb,
        message: Option<String>,
    },

    /// An asynchronous work request ended without succeeding
    #[error("work request {id} finished with status {status}{}", detail(.message))]
    WorkRequest {
        id: String,
        status: String,
        message: Option<String>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Reading from or writing to the configuration store failed
    #[error("{0}")]
    Data(String),
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {}", m),
        _ => String::new(),
    }
}

impl LifecycleError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// The underlying service error, if this error came from a remote call
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
