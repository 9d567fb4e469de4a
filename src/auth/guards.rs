use rocket::Request;
use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::jwt::{JwtService, TokenError};
use crate::auth::principal::PrincipalResolver;
use crate::auth::AuthState;
use crate::models::Identity;

/// Internal reason a request failed the auth gate. Logged, never sent to the
/// client: every variant except `Storage` renders as the same 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateFailure {
    /// Missing header, or not exactly `Bearer <token>`.
    NoToken,
    /// The token could not be decoded.
    ParseFailed,
    /// Decoded, but signed with an algorithm outside the HMAC family.
    VerifyFailed,
    ExpiredOrBadSig,
    /// Token is valid but its identity no longer exists.
    PrincipalMissing,
    /// Identity lookup failed.
    Storage,
}

impl GateFailure {
    pub fn status(self) -> Status {
        match self {
            GateFailure::Storage => Status::InternalServerError,
            _ => Status::Unauthorized,
        }
    }
}

impl From<TokenError> for GateFailure {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => GateFailure::ParseFailed,
            TokenError::Expired | TokenError::BadSignature => GateFailure::ExpiredOrBadSig,
            TokenError::WrongAlgorithm | TokenError::Signing(_) => GateFailure::VerifyFailed,
        }
    }
}

/// Extract the token from an `Authorization` value of the exact form
/// `Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Run one request's credentials through the gate.
pub async fn authenticate(
    header: Option<&str>,
    jwt: &JwtService,
    resolver: &PrincipalResolver,
) -> Result<Identity, GateFailure> {
    let token = bearer_token(header).ok_or(GateFailure::NoToken)?;
    let claims = jwt.verify(token)?;

    match resolver.resolve(claims.identity_id).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(GateFailure::PrincipalMissing),
        Err(err) => {
            log::error!(
                "principal lookup for user {} failed: {}",
                claims.identity_id,
                err
            );
            Err(GateFailure::Storage)
        }
    }
}

/// Request guard for protected handlers. Carries the freshly resolved
/// identity.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub identity: Identity,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.identity.id
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = GateFailure;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<AuthState>>().await {
            Outcome::Success(state) => state,
            _ => {
                log::error!("auth state is not managed; rejecting request");
                return Outcome::Error((Status::InternalServerError, GateFailure::Storage));
            }
        };

        let header = request.headers().get_one("Authorization");
        match authenticate(header, &state.jwt_service, &state.resolver).await {
            Ok(identity) => Outcome::Success(AuthUser { identity }),
            Err(failure) => {
                log::warn!("auth gate rejected {} {}: {:?}", request.method(), request.uri(), failure);
                Outcome::Error((failure.status(), failure))
            }
        }
    }
}
