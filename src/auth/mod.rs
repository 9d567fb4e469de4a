//! Authentication core: credential hashing, bearer tokens, the request gate,
//! principal resolution and the password-reset flow, plus the `/users`
//! handlers built on top of them.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod principal;
pub mod reset;
pub mod responses;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, GateFailure};
pub use jwt::{JwtService, TokenError};
pub use passwords::{PasswordPolicy, PasswordService};
pub use principal::PrincipalResolver;
pub use reset::PasswordResetService;

use crate::notify::SharedNotifier;
use crate::store::SharedStore;

/// Everything the auth handlers and the request guard need, built once from
/// an explicit [`AuthConfig`].
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub store: SharedStore,
    pub password_service: Arc<PasswordService>,
    pub password_policy: PasswordPolicy,
    pub jwt_service: Arc<JwtService>,
    pub resolver: PrincipalResolver,
    pub reset_service: PasswordResetService,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        store: SharedStore,
        notifier: SharedNotifier,
    ) -> AuthResult<Self> {
        let password_service = Arc::new(PasswordService::new()?);
        let password_policy = config.password_policy();
        let jwt_service = Arc::new(JwtService::from_config(&config));
        let resolver = PrincipalResolver::new(store.clone());
        let reset_service = PasswordResetService::new(
            store.clone(),
            password_service.clone(),
            password_policy,
            notifier,
            config.reset_token_ttl,
        );

        Ok(Self {
            config,
            store,
            password_service,
            password_policy,
            jwt_service,
            resolver,
            reset_service,
        })
    }
}
