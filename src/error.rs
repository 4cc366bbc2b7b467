//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the credential
//! validator, the repositories and the HTTP/WS frontend, along with the
//! mapping to HTTP status codes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Application error taxonomy. Every variant carries a short machine
/// readable `code` and a human readable `message`. Validation errors use
/// the offending field name as their code so callers get field-level
/// detail without a separate payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Unauthenticated { code: String, message: String },
    InvalidCredentials { code: String, message: String },
    PrincipalNotFound { code: String, message: String },
    InactiveAccount { code: String, message: String },
    InsufficientPrivilege { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Validation { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::InvalidCredentials { code, .. }
            | AppError::PrincipalNotFound { code, .. }
            | AppError::InactiveAccount { code, .. }
            | AppError::InsufficientPrivilege { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Validation { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::InvalidCredentials { message, .. }
            | AppError::PrincipalNotFound { message, .. }
            | AppError::InactiveAccount { message, .. }
            | AppError::InsufficientPrivilege { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Validation { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self {
        AppError::Unauthenticated { code: "unauthenticated".into(), message: msg.into() }
    }
    pub fn invalid_credentials<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::InvalidCredentials { code: code.into(), message: msg.into() }
    }
    pub fn principal_not_found<S: Into<String>>(msg: S) -> Self {
        AppError::PrincipalNotFound { code: "principal_not_found".into(), message: msg.into() }
    }
    pub fn inactive<S: Into<String>>(msg: S) -> Self {
        AppError::InactiveAccount { code: "inactive_account".into(), message: msg.into() }
    }
    pub fn privilege<S: Into<String>>(msg: S) -> Self {
        AppError::InsufficientPrivilege { code: "insufficient_privilege".into(), message: msg.into() }
    }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Conflict { code: code.into(), message: msg.into() }
    }
    pub fn validation<S: Into<String>>(field: S, msg: S) -> Self {
        AppError::Validation { code: field.into(), message: msg.into() }
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AppError::Internal { code: "internal".into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::InvalidCredentials { .. } => 401,
            AppError::PrincipalNotFound { .. } => 404,
            AppError::InactiveAccount { .. } => 403,
            AppError::InsufficientPrivilege { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Validation { .. } => 422,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::unauthenticated("no creds").http_status(), 401);
        assert_eq!(AppError::invalid_credentials("expired_token", "old").http_status(), 401);
        assert_eq!(AppError::principal_not_found("gone").http_status(), 404);
        assert_eq!(AppError::inactive("disabled").http_status(), 403);
        assert_eq!(AppError::privilege("superuser required").http_status(), 403);
        assert_eq!(AppError::not_found("item_not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("email_taken", "dup").http_status(), 409);
        assert_eq!(AppError::validation("phone", "bad shape").http_status(), 422);
        assert_eq!(AppError::internal("panic").http_status(), 500);
    }

    #[test]
    fn validation_code_is_field_name() {
        let e = AppError::validation("after_field", "required with after_value");
        assert_eq!(e.code_str(), "after_field");
        assert_eq!(e.http_status(), 422);
    }
}
