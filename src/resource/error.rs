//! Resource core errors

use super::classify::{classify, ErrorKind};
use crate::remote::model::{RemoteError, ResourceRef, ResourceState};
use std::time::Duration;

/// Failure of a lifecycle or listing operation
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("timed out after {waited:?} waiting for {target} to become {expected}")]
    Timeout {
        target: ResourceRef,
        expected: ResourceState,
        waited: Duration,
    },
    #[error("{target} not found: {source}")]
    NotFound {
        target: ResourceRef,
        source: RemoteError,
    },
    #[error("{target} conflicts with an existing resource: {source}")]
    Conflict {
        target: ResourceRef,
        source: RemoteError,
    },
    #[error("permission denied on {target}: {source}")]
    PermissionDenied {
        target: ResourceRef,
        source: RemoteError,
    },
    #[error("{target}: gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        target: ResourceRef,
        attempts: u32,
        source: RemoteError,
    },
    /// A mutating call was throttled; it is never repeated automatically
    #[error("{target}: request was not accepted, try again: {source}")]
    Retryable {
        target: ResourceRef,
        source: RemoteError,
    },
    #[error("{target}: {source}")]
    Fatal {
        target: ResourceRef,
        source: RemoteError,
    },
    #[error("listing failed: {source}")]
    Listing { source: RemoteError },
}

impl CoreError {
    /// Wrap a remote failure according to its class
    pub fn from_remote(target: &ResourceRef, source: RemoteError) -> Self {
        let target = target.clone();
        match classify(&source).kind {
            ErrorKind::NotFound => Self::NotFound { target, source },
            ErrorKind::Conflict => Self::Conflict { target, source },
            ErrorKind::PermissionDenied => Self::PermissionDenied { target, source },
            ErrorKind::Retryable => Self::Retryable { target, source },
            ErrorKind::Fatal => Self::Fatal { target, source },
        }
    }

    /// Class of this error; `Timeout` and exhausted retries count as retryable
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::RetriesExhausted { .. } | Self::Retryable { .. } => {
                ErrorKind::Retryable
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Fatal { .. } => ErrorKind::Fatal,
            Self::Listing { source } => classify(source).kind,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Underlying provider error, when there is one
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Timeout { .. } => None,
            Self::NotFound { source, .. }
            | Self::Conflict { source, .. }
            | Self::PermissionDenied { source, .. }
            | Self::RetriesExhausted { source, .. }
            | Self::Retryable { source, .. }
            | Self::Fatal { source, .. }
            | Self::Listing { source } => Some(source),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
