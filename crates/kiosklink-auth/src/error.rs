//! Protocol error taxonomy

use crate::storage::StorageError;
use thiserror::Error;

/// Errors returned by the registrar, pairing coordinator, liveness tracker,
/// ownership directory and account service
///
/// Failures never leave partial writes behind: every mutation runs inside a
/// single store transaction that is discarded on error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    /// Missing, expired and mismatched codes are deliberately indistinguishable
    #[error("Pairing code invalid or expired")]
    PairingInvalid,
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Server-side failure not caused by the request
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Password hashing error: {0}")]
    PasswordHash(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AuthError::InvalidInput(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AuthError::NotFound(what.into())
    }

    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::NotFound(_) => "not_found",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Forbidden => "forbidden",
            AuthError::PairingInvalid => "pairing_invalid",
            AuthError::Conflict(_) => "conflict",
            AuthError::Internal(_) | AuthError::PasswordHash(_) | AuthError::Storage(_) => {
                "internal"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::invalid_input("x").code(), "invalid_input");
        assert_eq!(AuthError::not_found("dev-1").code(), "not_found");
        assert_eq!(AuthError::Unauthorized.code(), "unauthorized");
        assert_eq!(AuthError::Forbidden.code(), "forbidden");
        assert_eq!(AuthError::PairingInvalid.code(), "pairing_invalid");
        assert_eq!(AuthError::Conflict("u".into()).code(), "conflict");
        assert_eq!(AuthError::Internal("ids".into()).code(), "internal");
        assert_eq!(
            AuthError::Storage(StorageError::Io(std::io::Error::other("disk full"))).code(),
            "internal"
        );
    }
}
