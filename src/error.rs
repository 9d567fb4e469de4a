use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::models::ApiResponse;
use crate::store::StoreError;

pub const PERMISSION_DENIED: &str = "permission denied";
pub const INVALID_CREDENTIALS: &str = "invalid email or password";
pub const INVALID_RESET_TOKEN: &str = "invalid or expired reset token";
const INTERNAL_ERROR: &str = "internal server error";
const DELIVERY_FAILED: &str = "could not deliver the reset email, try again later";

/// Wire shape of every error: the JSON envelope without `data`.
pub type ErrorResponse = status::Custom<Json<ApiResponse<()>>>;

pub type ApiResult<T> = Result<T, ErrorResponse>;

/// Errors a handler can surface to a client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("delivery failure: {0}")]
    DeliveryFailure(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::InputInvalid(_) => Status::BadRequest,
            ApiError::AuthenticationFailed(_) => Status::Unauthorized,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::StorageFailure(_) => Status::InternalServerError,
            ApiError::DeliveryFailure(_) => Status::BadGateway,
        }
    }

    /// Message safe to show a client. Storage and delivery details stay in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::InputInvalid(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => {
                msg.clone()
            }
            ApiError::AuthenticationFailed(msg) => (*msg).to_string(),
            ApiError::StorageFailure(_) => INTERNAL_ERROR.to_string(),
            ApiError::DeliveryFailure(_) => DELIVERY_FAILED.to_string(),
        }
    }
}

pub fn error_response(status: Status, message: impl Into<String>) -> ErrorResponse {
    status::Custom(status, Json(ApiResponse::message(status.code, message)))
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::StorageFailure(_) | ApiError::DeliveryFailure(_) => {
                log::error!("{}", err)
            }
            _ => log::debug!("{}", err),
        }
        error_response(err.status(), err.public_message())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::InvalidReference(msg) => ApiError::InputInvalid(msg),
            StoreError::Timeout(_) | StoreError::Database(_) => {
                ApiError::StorageFailure(err.to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::AuthenticationFailed(INVALID_CREDENTIALS),
            AuthError::Token(_) => ApiError::AuthenticationFailed(PERMISSION_DENIED),
            AuthError::WeakPassword(msg) => ApiError::InputInvalid(msg),
            AuthError::EmailNotFound => ApiError::NotFound("email not found".into()),
            AuthError::ResetTokenNotFound | AuthError::ResetTokenExpired => {
                ApiError::InputInvalid(INVALID_RESET_TOKEN.into())
            }
            AuthError::Storage(store) => ApiError::from(store),
            AuthError::Delivery(delivery) => ApiError::DeliveryFailure(delivery.to_string()),
            AuthError::Config(_) | AuthError::Argon2(_) | AuthError::PasswordHash(_) => {
                ApiError::StorageFailure(err.to_string())
            }
        }
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(err: StoreError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<AuthError> for ErrorResponse {
    fn from(err: AuthError) -> Self {
        ApiError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::jwt::TokenError;
    use crate::notify::DeliveryError;

    #[test]
    fn store_errors_map_by_kind() {
        assert!(matches!(
            ApiError::from(StoreError::Conflict("dup".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::InvalidReference("gone".into())),
            ApiError::InputInvalid(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::Timeout(Duration::from_secs(5))),
            ApiError::StorageFailure(_)
        ));
    }

    #[test]
    fn auth_failures_share_one_message() {
        for err in [
            AuthError::Token(TokenError::Expired),
            AuthError::Token(TokenError::BadSignature),
            AuthError::Token(TokenError::WrongAlgorithm),
        ] {
            let api = ApiError::from(err);
            assert_eq!(api.status(), Status::Unauthorized);
            assert_eq!(api.public_message(), PERMISSION_DENIED);
        }
    }

    #[test]
    fn reset_token_failures_are_indistinguishable() {
        let missing = ApiError::from(AuthError::ResetTokenNotFound);
        let expired = ApiError::from(AuthError::ResetTokenExpired);
        assert_eq!(missing.status(), Status::BadRequest);
        assert_eq!(missing.public_message(), expired.public_message());
    }

    #[test]
    fn internal_details_are_not_rendered() {
        let response: ErrorResponse = AuthError::PasswordHash("salt too short".into()).into();
        assert_eq!(response.0, Status::InternalServerError);
        assert_eq!(response.1.message, INTERNAL_ERROR);
        assert_eq!(response.1.status_code, 500);
        assert!(response.1.data.is_none());

        let response: ErrorResponse =
            AuthError::Delivery(DeliveryError::Transport("smtp down".into())).into();
        assert_eq!(response.0, Status::BadGateway);
        assert!(!response.1.message.contains("smtp"));
    }
}
