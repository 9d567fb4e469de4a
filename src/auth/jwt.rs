use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::crypto;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::auth::AuthConfig;

/// Why a bearer token was rejected, or why one could not be minted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected signing algorithm")]
    WrongAlgorithm,
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidAlgorithmName => TokenError::WrongAlgorithm,
            _ => TokenError::Malformed,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims that survived verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub identity_id: i64,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        // Only the HMAC family is accepted; anything else in the header
        // fails before the signature is looked at.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key,
            decoding_key,
            validation,
            token_ttl: config.token_ttl,
        }
    }

    pub fn issue(&self, identity_id: i64) -> Result<SignedToken, TokenError> {
        self.issue_at(identity_id, Utc::now())
    }

    pub fn issue_at(&self, identity_id: i64, now: DateTime<Utc>) -> Result<SignedToken, TokenError> {
        let expires_at = now + self.token_ttl;
        let claims = TokenClaims {
            sub: identity_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))?;

        Ok(SignedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(TokenError::from)
            .map_err(|err| match err {
                TokenError::Malformed if self.signature_mismatch(token) => {
                    TokenError::BadSignature
                }
                other => other,
            })?;
        let identity_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::Malformed)?;
        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or(TokenError::Malformed)?;

        Ok(VerifiedClaims {
            identity_id,
            expires_at,
        })
    }

    /// A token shaped like one of ours whose signature does not cover its
    /// header and payload. Lets a corrupted header surface as a signature
    /// failure instead of a parse failure.
    fn signature_mismatch(&self, token: &str) -> bool {
        let Some((message, signature)) = token.rsplit_once('.') else {
            return false;
        };
        if message.split('.').count() != 2 {
            return false;
        }
        let algorithm = match signature.len() {
            43 => Algorithm::HS256,
            64 => Algorithm::HS384,
            86 => Algorithm::HS512,
            _ => return false,
        };
        !crypto::verify(signature, message.as_bytes(), &self.decoding_key, algorithm)
            .unwrap_or(false)
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }
}
