use rocket::http::Status;
use thiserror::Error;

use crate::auth::jwt::TokenError;
use crate::notify::DeliveryError;
use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token rejected: {0}")]
    Token(#[from] TokenError),
    #[error("weak password: {0}")]
    WeakPassword(String),
    #[error("no identity registered for this email")]
    EmailNotFound,
    #[error("reset token not found")]
    ResetTokenNotFound,
    #[error("reset token expired")]
    ResetTokenExpired,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials | AuthError::Token(_) => Status::Unauthorized,
            AuthError::WeakPassword(_)
            | AuthError::ResetTokenNotFound
            | AuthError::ResetTokenExpired => Status::BadRequest,
            AuthError::EmailNotFound => Status::NotFound,
            AuthError::Delivery(_) => Status::BadGateway,
            AuthError::Storage(StoreError::Conflict(_)) => Status::Conflict,
            AuthError::Config(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Storage(_) => Status::InternalServerError,
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(AuthError::InvalidCredentials.status(), Status::Unauthorized);
        assert_eq!(
            AuthError::Token(TokenError::Expired).status(),
            Status::Unauthorized
        );
        assert_eq!(AuthError::ResetTokenExpired.status(), Status::BadRequest);
        assert_eq!(
            AuthError::Storage(StoreError::Conflict("dup".into())).status(),
            Status::Conflict
        );
        assert_eq!(
            AuthError::Storage(StoreError::Timeout(Duration::from_secs(1))).status(),
            Status::InternalServerError
        );
        assert_eq!(
            AuthError::PasswordHash("bad".into()).status(),
            Status::InternalServerError
        );
    }
}
