//! Missing-resource classification
//!
//! Decides whether an error means "the remote resource is gone". The
//! orchestrator uses this after a failed delete and inside the state-refresh
//! poll, where a vanished resource is an expected terminal case.

use crate::error::{LifecycleError, ServiceError};

/// Service error codes that identify a missing resource
const NOT_FOUND_CODES: &[&str] = &["NotFound", "NotAuthorizedOrNotFound", "ResourceNotFound"];

/// Structured check on a service error
pub fn is_missing_service_error(err: &ServiceError) -> bool {
    err.status_code == 404 || NOT_FOUND_CODES.contains(&err.code.as_str())
}

/// Whether `err` means the resource no longer exists
///
/// Service errors are classified by status and code. Anything else falls back
/// to [`compat::message_indicates_missing`].
pub fn is_missing_resource(err: &LifecycleError) -> bool {
    match err {
        LifecycleError::Service(e) => {
            is_missing_service_error(e) || compat::message_indicates_missing(&e.message)
        }
        LifecycleError::NotFound { .. } => true,
        other => compat::message_indicates_missing(&other.to_string()),
    }
}

/// Message matching for errors that carry no status code
///
/// Fragile: relies on the wording of human readable messages. Some services
/// (the load balancer one in particular) report a missing child object as
/// "Load balancer X has no listener Y" without a 404.
pub mod compat {
    const PHRASES: &[&str] = &[
        "does not exist",
        "not found",
        "status code: 404",
        " not present in ",
    ];

    pub fn message_indicates_missing(message: &str) -> bool {
        let lower = message.to_lowercase();
        if PHRASES.iter().any(|p| lower.contains(p)) {
            return true;
        }
        message.contains("Load balancer") && message.contains(" has no ")
    }
}
