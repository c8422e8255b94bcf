use thiserror::Error;

/// Typed failures surfaced by the remote data gateway.
///
/// Read paths fail with `RemoteQuery`, write paths with `RemoteMutation` or
/// `Permission`; `Validation` is raised client-side before any remote call.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("query failed: {message}")]
    RemoteQuery { message: String },

    #[error("mutation failed: {message}")]
    RemoteMutation { message: String },

    #[error("not allowed: {message}")]
    Permission { message: String },
}

impl GatewayError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        GatewayError::RemoteQuery {
            message: message.into(),
        }
    }

    pub fn mutation(message: impl Into<String>) -> Self {
        GatewayError::RemoteMutation {
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        GatewayError::Permission {
            message: message.into(),
        }
    }

    /// True for authorization/state denials, so UIs can show a specific
    /// "not allowed" affordance instead of a generic failure.
    pub fn is_permission(&self) -> bool {
        matches!(self, GatewayError::Permission { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GatewayError::Validation { .. })
    }
}
