//! Single-use, time-bounded password-reset tokens.
//!
//! A token is 32 random bytes, base64url encoded. Only its SHA-256 digest is
//! persisted, one row per identity; requesting a new token overwrites the
//! previous one. Confirming a token deletes it and stores the new password
//! hash in a single storage transaction.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::auth::passwords::{PasswordPolicy, PasswordService};
use crate::auth::{AuthError, AuthResult};
use crate::notify::SharedNotifier;
use crate::store::SharedStore;

const RESET_TOKEN_BYTES: usize = 32;

/// A freshly minted token. The plaintext only ever lives here.
#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub user_id: i64,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_reset_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct PasswordResetService {
    store: SharedStore,
    passwords: Arc<PasswordService>,
    policy: PasswordPolicy,
    notifier: SharedNotifier,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        store: SharedStore,
        passwords: Arc<PasswordService>,
        policy: PasswordPolicy,
        notifier: SharedNotifier,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            passwords,
            policy,
            notifier,
            ttl,
        }
    }

    pub async fn request_reset(&self, email: &str) -> AuthResult<IssuedResetToken> {
        self.request_reset_at(email, Utc::now()).await
    }

    pub async fn request_reset_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedResetToken> {
        let identity = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        let token = generate_reset_token();
        let expires_at = now + self.ttl;
        self.store
            .upsert_reset_token(identity.id, &hash_reset_token(&token), expires_at)
            .await?;

        log::info!("issued password reset token for user {}", identity.id);
        Ok(IssuedResetToken {
            user_id: identity.id,
            email: identity.email,
            token,
            expires_at,
        })
    }

    pub async fn validate_and_consume(&self, token: &str, new_password: &str) -> AuthResult<i64> {
        self.validate_and_consume_at(token, new_password, Utc::now())
            .await
    }

    /// Returns the identity whose password was replaced.
    pub async fn validate_and_consume_at(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<i64> {
        let token_hash = hash_reset_token(token);
        let record = self
            .store
            .find_reset_token(&token_hash)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;

        if now > record.expires_at {
            if let Err(err) = self.store.delete_reset_token(&token_hash).await {
                log::warn!(
                    "failed to drop expired reset token for user {}: {}",
                    record.user_id,
                    err
                );
            }
            return Err(AuthError::ResetTokenExpired);
        }

        self.policy.check(new_password)?;
        let password_hash = self.passwords.hash_password(new_password)?;

        // A concurrent confirm may have claimed the row since the lookup.
        let user_id = self
            .store
            .complete_password_reset(&token_hash, &password_hash, now)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;

        log::info!("password reset completed for user {}", user_id);
        Ok(user_id)
    }

    /// Issue a token and hand it to the notifier. An unknown email is not an
    /// error here so callers cannot probe for registered addresses. When
    /// delivery fails the token is withdrawn again.
    pub async fn issue_and_deliver(&self, email: &str) -> AuthResult<()> {
        let issued = match self.request_reset(email).await {
            Ok(issued) => issued,
            Err(AuthError::EmailNotFound) => {
                log::debug!("password reset requested for unregistered email");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self
            .notifier
            .deliver_reset_token(&issued.email, &issued.token)
            .await
        {
            log::error!(
                "reset token delivery failed for user {}: {}",
                issued.user_id,
                err
            );
            if let Err(store_err) = self
                .store
                .delete_reset_token(&hash_reset_token(&issued.token))
                .await
            {
                log::error!(
                    "could not withdraw undelivered reset token for user {}: {}",
                    issued.user_id,
                    store_err
                );
            }
            return Err(AuthError::Delivery(err));
        }

        Ok(())
    }
}
