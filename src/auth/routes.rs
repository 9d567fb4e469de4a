use std::sync::LazyLock;

use regex::Regex;
use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::auth::guards::AuthUser;
use crate::auth::responses::{
    AuthTokenResponse, LoginRequest, PasswordResetConfirm, PasswordResetRequest, RegisterRequest,
};
use crate::auth::{AuthError, AuthState};
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, Identity, NewIdentity, ProfilePatch, UserProfile};

pub const RESET_REQUESTED_MESSAGE: &str =
    "if that email is registered, a reset token has been sent to it";

static EMAIL_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE
        .as_ref()
        .is_some_and(|shape| shape.is_match(email.trim()))
}

fn token_response(
    state: &AuthState,
    identity: &Identity,
) -> Result<AuthTokenResponse, AuthError> {
    let signed = state.jwt_service.issue(identity.id)?;
    Ok(AuthTokenResponse {
        token: signed.token,
        expires_at: signed.expires_at,
        user: UserProfile::from(identity),
    })
}

/// Create an identity and return a bearer token for it.
#[openapi(tag = "Users")]
#[post("/users/register", data = "<request>")]
pub async fn register(
    state: &State<AuthState>,
    request: Json<RegisterRequest>,
) -> ApiResult<status::Custom<Json<ApiResponse<AuthTokenResponse>>>> {
    let request = request.into_inner();
    if let Some(field) = request.missing_field() {
        return Err(ApiError::InputInvalid(format!("missing required field: {field}")).into());
    }
    if !is_valid_email(&request.email) {
        return Err(ApiError::InputInvalid("invalid email address".into()).into());
    }
    state.password_policy.check(&request.password)?;

    let password_hash = state.password_service.hash_password(&request.password)?;
    let identity = state
        .store
        .create_user(NewIdentity {
            email: request.email.trim().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: request.phone,
            address: request.address,
            password_hash,
        })
        .await?;

    log::info!("registered user {}", identity.id);
    let response = token_response(state, &identity)?;
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::new(201, "user registered", response)),
    ))
}

/// Exchange email and password for a bearer token.
#[openapi(tag = "Users")]
#[post("/users/login", data = "<request>")]
pub async fn login(
    state: &State<AuthState>,
    request: Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthTokenResponse>>> {
    let request = request.into_inner();

    let Some(identity) = state.store.find_user_by_email(&request.email).await? else {
        state.password_service.verify_against_dummy(&request.password);
        log::debug!("login rejected: unknown email");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !state
        .password_service
        .verify_password(&request.password, &identity.password_hash)?
    {
        log::debug!("login rejected for user {}: password mismatch", identity.id);
        return Err(AuthError::InvalidCredentials.into());
    }

    let response = token_response(state, &identity)?;
    Ok(Json(ApiResponse::ok("login successful", response)))
}

/// Profile of the authenticated identity.
#[openapi(tag = "Users")]
#[get("/users/me")]
pub async fn me(user: AuthUser) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok(
        "profile retrieved",
        UserProfile::from(&user.identity),
    ))
}

/// Update any subset of the caller's profile fields.
#[openapi(tag = "Users")]
#[put("/users/me", data = "<patch>")]
pub async fn update_me(
    state: &State<AuthState>,
    user: AuthUser,
    patch: Json<ProfilePatch>,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let patch = patch.into_inner();
    if patch.is_empty() {
        return Err(ApiError::InputInvalid("no profile fields provided".into()).into());
    }
    for (field, value) in [
        ("firstName", &patch.first_name),
        ("lastName", &patch.last_name),
        ("email", &patch.email),
    ] {
        if value.as_deref().is_some_and(|value| value.trim().is_empty()) {
            return Err(ApiError::InputInvalid(format!("{field} must not be empty")).into());
        }
    }
    if patch.email.as_deref().is_some_and(|email| !is_valid_email(email)) {
        return Err(ApiError::InputInvalid("invalid email address".into()).into());
    }

    let updated = state
        .store
        .update_profile(user.id(), &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(ApiResponse::ok(
        "profile updated",
        UserProfile::from(&updated),
    )))
}

/// Start a password reset. Answers the same way whether or not the email
/// belongs to an identity.
#[openapi(tag = "Users")]
#[post("/users/reset-password", data = "<request>")]
pub async fn request_password_reset(
    state: &State<AuthState>,
    request: Json<PasswordResetRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let email = request.into_inner().email;
    if email.trim().is_empty() {
        return Err(ApiError::InputInvalid("missing required field: email".into()).into());
    }

    state.reset_service.issue_and_deliver(&email).await?;
    Ok(Json(ApiResponse::message(200, RESET_REQUESTED_MESSAGE)))
}

/// Redeem a reset token and set a new password.
#[openapi(tag = "Users")]
#[post("/users/reset-password/confirm", data = "<request>")]
pub async fn confirm_password_reset(
    state: &State<AuthState>,
    request: Json<PasswordResetConfirm>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let request = request.into_inner();
    state
        .reset_service
        .validate_and_consume(&request.reset_token, &request.new_password)
        .await?;
    Ok(Json(ApiResponse::message(200, "password has been reset")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email(" A.B@sub.example.org "));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spa ce@x.com"));
    }
}
