//! Unified error handling for the BreezeChat services.
//!
//! Business handlers never propagate errors across the RPC boundary: every
//! failure is converted into a `{success=false, errmsg}` response, and this
//! module decides how loudly each class is logged. Fatal startup conditions
//! (broker/index declaration, config validation) are not represented here -
//! they bubble up as `anyhow` errors in the binaries and exit the process.

use thiserror::Error;
use tracing::{debug, error, info};

/// Errors raised by the business cores.
///
/// The payload string is the user-visible `errmsg`; operational detail is
/// logged at the call site before the error is constructed.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// User input failed a syntactic or semantic rule.
    #[error("{0}")]
    Validation(String),

    /// A referenced identity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with existing state (duplicate nickname,
    /// duplicate login, taken email).
    #[error("{0}")]
    Conflict(String),

    /// A downstream service was unavailable or returned failure.
    #[error("{0}")]
    Dependency(String),

    /// A multi-store write failed partway; compensation was attempted.
    #[error("{0}")]
    Consistency(String),
}

impl ServiceError {
    /// Static code for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Dependency(_) => "dependency",
            Self::Consistency(_) => "consistency",
        }
    }

    /// The message surfaced to the caller as `errmsg`.
    pub fn errmsg(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Dependency(m)
            | Self::Consistency(m) => m,
        }
    }

    /// Log the error at the level its class warrants.
    ///
    /// Validation noise stays at DEBUG; missing identities and conflicts are
    /// INFO; dependency and consistency failures are operator-relevant.
    pub fn observe(&self, request_id: &str) {
        match self {
            Self::Validation(m) => debug!(request_id, errmsg = %m, "request rejected"),
            Self::NotFound(m) => info!(request_id, errmsg = %m, "identity not found"),
            Self::Conflict(m) => info!(request_id, errmsg = %m, "request conflict"),
            Self::Dependency(m) => error!(request_id, errmsg = %m, "dependency failure"),
            Self::Consistency(m) => error!(request_id, errmsg = %m, "consistency failure"),
        }
    }
}

/// Result type for business operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(ServiceError::Validation("x".into()).error_code(), "validation");
        assert_eq!(ServiceError::Conflict("x".into()).error_code(), "conflict");
        assert_eq!(ServiceError::Dependency("x".into()).error_code(), "dependency");
    }

    #[test]
    fn errmsg_passthrough() {
        let e = ServiceError::NotFound("用户不存在".into());
        assert_eq!(e.errmsg(), "用户不存在");
        assert_eq!(e.to_string(), "用户不存在");
    }
}
