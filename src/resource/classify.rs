//! Error classification
//!
//! Decides what a remote failure means for the caller: try again, treat as
//! absent, report a collision, or give up.

use crate::remote::model::{RemoteError, TRANSPORT_ERROR_CODE};
use std::fmt;
use std::time::Duration;

/// Outcome class of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Throttling or a transient fault, safe to repeat
    Retryable,
    NotFound,
    /// The resource already exists or is in a conflicting state
    Conflict,
    PermissionDenied,
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission-denied",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure with the provider's retry hint, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub kind: ErrorKind,
    pub retry_after: Option<Duration>,
}

const RETRYABLE_CODES: &[&str] = &[
    "throttling",
    "throttled",
    "slowdown",
    "provisionedthroughputexceeded",
    "requestlimitexceeded",
    "toomanyrequests",
    "serviceunavailable",
    "internalerror",
    "internalfailure",
    "internalservererror",
    "requesttimeout",
    "limitexceeded",
    "operationaborted",
];

const CONFLICT_CODES: &[&str] = &[
    "alreadyexists",
    "alreadyowned",
    "resourceinuse",
    "conditionalcheckfailed",
    "bucketnotempty",
    "conflict",
];

const NOT_FOUND_CODES: &[&str] = &["notfound", "nosuch", "doesnotexist"];

const PERMISSION_CODES: &[&str] = &[
    "accessdenied",
    "unauthorized",
    "authorization",
    "forbidden",
    "expiredtoken",
    "invalidclienttokenid",
    "signaturedoesnotmatch",
];

/// Normalise a provider code for substring matching
/// (`ThrottlingException`, `THROTTLING`, `throttling-exception` all agree)
fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn kind_from_code(code: &str) -> Option<ErrorKind> {
    if code == TRANSPORT_ERROR_CODE {
        return Some(ErrorKind::Retryable);
    }

    let code = normalize_code(code);
    let matches = |table: &[&str]| table.iter().any(|needle| code.contains(needle));

    // Order matters: "BucketAlreadyOwnedByYou" must not be read as an authorization code
    if matches(CONFLICT_CODES) {
        Some(ErrorKind::Conflict)
    } else if matches(RETRYABLE_CODES) {
        Some(ErrorKind::Retryable)
    } else if matches(NOT_FOUND_CODES) {
        Some(ErrorKind::NotFound)
    } else if matches(PERMISSION_CODES) {
        Some(ErrorKind::PermissionDenied)
    } else {
        None
    }
}

fn kind_from_status(status: u16) -> Option<ErrorKind> {
    match status {
        408 | 429 | 500 | 502 | 503 | 504 => Some(ErrorKind::Retryable),
        404 | 410 => Some(ErrorKind::NotFound),
        409 | 412 => Some(ErrorKind::Conflict),
        401 | 403 => Some(ErrorKind::PermissionDenied),
        _ => None,
    }
}

/// Classify a remote failure.
///
/// The provider code wins over the HTTP status; anything unrecognised is fatal.
pub fn classify(error: &RemoteError) -> ErrorClass {
    let kind = error
        .code
        .as_deref()
        .and_then(kind_from_code)
        .or_else(|| error.status.and_then(kind_from_status))
        .unwrap_or(ErrorKind::Fatal);

    ErrorClass {
        kind,
        retry_after: error.retry_after,
    }
}

/// Format a remote failure for display.
/// Generic messages avoid echoing raw provider details back to the terminal.
pub fn describe(error: &RemoteError) -> String {
    match classify(error).kind {
        ErrorKind::PermissionDenied if error.status == Some(401) => {
            "Authentication failed. Check the credentials configured for the endpoint.".to_string()
        }
        ErrorKind::PermissionDenied => {
            "Permission denied. Check the access policy for this resource.".to_string()
        }
        ErrorKind::NotFound => "Resource not found.".to_string(),
        ErrorKind::Conflict => {
            "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        ErrorKind::Retryable if error.status == Some(429) => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        ErrorKind::Retryable => "Service temporarily unavailable. Please try again.".to_string(),
        ErrorKind::Fatal => {
            let sanitized: String = error
                .to_string()
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(80)
                .collect();
            if sanitized.len() < error.to_string().len() {
                format!("{sanitized}...")
            } else {
                sanitized
            }
        }
    }
}
