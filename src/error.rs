//! Error types for usdk-target

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Exit code used when the container backend cannot be reached
pub const EXIT_NO_ACCESS: i32 = 255;
/// Exit code used when a container needs to be fixed
pub const EXIT_NEEDS_FIXING: i32 = 254;
/// Exit code used when the LXD bridge has no subnet configured
pub const EXIT_NO_BRIDGE: i32 = 253;

/// A detected divergence between a container's actual and required configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Container the divergence was found in
    pub container: String,
    /// Offending host path or device name
    pub resource: String,
    /// Human readable description
    pub reason: String,
}

impl Violation {
    pub fn new(
        container: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.container, self.reason, self.resource)
    }
}

/// Broad category of a [`TargetError`], used by callers to pick an exit condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Connectivity,
    Violation,
    Remediation,
    Generic,
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Could not talk to the container backend: {0}")]
    Connectivity(String),

    #[error("Container needs fixing: {0}")]
    Violation(Violation),

    #[error("Failed to fix container {container}: {message}")]
    Remediation { container: String, message: String },

    #[error("Backend operation '{operation}' failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("Backend operation '{operation}' did not finish within {timeout:?}")]
    OperationTimedOut { operation: String, timeout: Duration },

    #[error("Backend operation '{0}' was cancelled")]
    OperationCancelled(String),

    #[error("Failed to inspect container {container}: {message}")]
    Inspection { container: String, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Unexpected backend response: {0}")]
    Backend(String),

    #[error("LXD bridge is not configured: {0}")]
    BridgeNotConfigured(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TargetError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TargetError::Connectivity(_) => ErrorClass::Connectivity,
            TargetError::Violation(_) => ErrorClass::Violation,
            TargetError::Remediation { .. }
            | TargetError::OperationFailed { .. }
            | TargetError::OperationTimedOut { .. }
            | TargetError::OperationCancelled(_)
            | TargetError::PermissionDenied(_) => ErrorClass::Remediation,
            _ => ErrorClass::Generic,
        }
    }

    /// Whether repeating the same call could succeed without anything being fixed first
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TargetError::Connectivity(_)
                | TargetError::OperationTimedOut { .. }
                | TargetError::OperationCancelled(_)
        )
    }

    /// The violation carried by this error, if it is one
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            TargetError::Violation(v) => Some(v),
            _ => None,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TargetError::BridgeNotConfigured(_) => EXIT_NO_BRIDGE,
            _ => match self.class() {
                ErrorClass::Connectivity => EXIT_NO_ACCESS,
                ErrorClass::Violation => EXIT_NEEDS_FIXING,
                _ => 1,
            },
        }
    }

    pub(crate) fn inspection(container: &str, message: impl Into<String>) -> Self {
        TargetError::Inspection {
            container: container.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn remediation(container: &str, message: impl Into<String>) -> Self {
        TargetError::Remediation {
            container: container.to_string(),
            message: message.into(),
        }
    }
}

impl From<Violation> for TargetError {
    fn from(v: Violation) -> Self {
        TargetError::Violation(v)
    }
}

pub type Result<T> = std::result::Result<T, TargetError>;
