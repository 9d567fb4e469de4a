use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::auth::passwords::PasswordPolicy;
use crate::auth::{AuthError, AuthResult};

/// Signing secret used when `TRACKER_ENV` is not `production` and no secret
/// was supplied. Never accepted in production.
pub const DEVELOPMENT_JWT_SECRET: &str = "tracker-development-signing-secret-change-me";

pub const MIN_PRODUCTION_SECRET_BYTES: usize = 32;
pub const TOKEN_TTL_DAYS: i64 = 120;
pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> AuthResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(AuthError::Config(format!(
                "TRACKER_ENV must be 'development' or 'production', got '{other}'"
            ))),
        }
    }
}

/// SMTP settings for reset-token delivery. An empty `host` disables sending.
#[derive(Clone, Default)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub starttls: bool,
}

impl EmailSettings {
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("starttls", &self.starttls)
            .finish()
    }
}

/// Auth configuration. Built once at startup and handed to each component.
#[derive(Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub min_password_length: usize,
    pub storage_timeout: StdDuration,
    pub email: EmailSettings,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Environment::parse(&lookup("TRACKER_ENV").unwrap_or_default())?;

        let jwt_secret = match (environment, lookup("TRACKER_JWT_SECRET")) {
            (Environment::Production, Some(secret))
                if secret.len() >= MIN_PRODUCTION_SECRET_BYTES =>
            {
                secret
            }
            (Environment::Production, Some(_)) => {
                return Err(AuthError::Config(format!(
                    "TRACKER_JWT_SECRET must be at least {MIN_PRODUCTION_SECRET_BYTES} bytes in production"
                )));
            }
            (Environment::Production, None) => {
                return Err(AuthError::Config(
                    "TRACKER_JWT_SECRET is required in production".into(),
                ));
            }
            (Environment::Development, Some(secret)) if !secret.is_empty() => secret,
            (Environment::Development, _) => {
                log::warn!("TRACKER_JWT_SECRET not set; using the development signing secret");
                DEVELOPMENT_JWT_SECRET.to_string()
            }
        };

        let storage_timeout_secs = lookup("TRACKER_STORAGE_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS);

        let email = EmailSettings {
            host: lookup("TRACKER_SMTP_HOST").unwrap_or_default(),
            port: lookup("TRACKER_SMTP_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(587),
            username: lookup("TRACKER_SMTP_USERNAME").unwrap_or_default(),
            password: lookup("TRACKER_SMTP_PASSWORD").unwrap_or_default(),
            from: lookup("TRACKER_SMTP_FROM")
                .unwrap_or_else(|| "Tracker <no-reply@localhost>".into()),
            starttls: lookup("TRACKER_SMTP_STARTTLS")
                .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
                .unwrap_or(true),
        };

        Ok(Self {
            environment,
            jwt_secret,
            token_ttl: Duration::days(TOKEN_TTL_DAYS),
            reset_token_ttl: Duration::seconds(RESET_TOKEN_TTL_SECS),
            min_password_length: PasswordPolicy::DEFAULT_MIN_LENGTH,
            storage_timeout: StdDuration::from_secs(storage_timeout_secs),
            email,
        })
    }

    /// Development configuration with an explicit secret and no SMTP.
    pub fn development(secret: impl Into<String>) -> Self {
        Self {
            environment: Environment::Development,
            jwt_secret: secret.into(),
            token_ttl: Duration::days(TOKEN_TTL_DAYS),
            reset_token_ttl: Duration::seconds(RESET_TOKEN_TTL_SECS),
            min_password_length: PasswordPolicy::DEFAULT_MIN_LENGTH,
            storage_timeout: StdDuration::from_secs(DEFAULT_STORAGE_TIMEOUT_SECS),
            email: EmailSettings::default(),
        }
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::new(self.min_password_length)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("environment", &self.environment)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("reset_token_ttl", &self.reset_token_ttl)
            .field("min_password_length", &self.min_password_length)
            .field("storage_timeout", &self.storage_timeout)
            .field("email", &self.email)
            .finish()
    }
}
