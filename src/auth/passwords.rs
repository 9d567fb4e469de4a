use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// Argon2id work factor: 19 MiB memory, 2 passes, 1 lane.
pub const ARGON2_M_COST_KIB: u32 = 19 * 1024;
pub const ARGON2_T_COST: u32 = 2;
pub const ARGON2_P_COST: u32 = 1;

/// Salted Argon2id hashing. Verification goes through the argon2 crate's
/// constant-time output comparison.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(ARGON2_M_COST_KIB);
        builder.t_cost(ARGON2_T_COST);
        builder.p_cost(ARGON2_P_COST);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut service = Self {
            argon2,
            dummy_hash: String::new(),
        };

        // Hashed up front so the first unknown-email login costs the same as
        // every later one.
        let mut filler = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut filler);
        service.dummy_hash = service.hash_password(&STANDARD_NO_PAD.encode(filler))?;
        Ok(service)
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; `Err` only when `encoded` is not a valid PHC string.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burn the same amount of work as a real verification so that an unknown
    /// account is indistinguishable by timing. Always returns `false`.
    pub fn verify_against_dummy(&self, password: &str) -> bool {
        if let Err(err) = self.verify_password(password, &self.dummy_hash) {
            log::debug!("dummy password verification failed: {}", err);
        }
        false
    }
}

/// Minimum-strength rules applied to every new password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl PasswordPolicy {
    pub const DEFAULT_MIN_LENGTH: usize = 8;

    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    pub fn check(&self, password: &str) -> AuthResult<()> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakPassword(format!(
                "password must be at least {} characters long",
                self.min_length
            )));
        }
        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_LENGTH)
    }
}
