//! HS256 JWT session validator.
//!
//! Tokens are signed with a shared secret and carry the user id in a
//! `userId` claim. `exp` is required and checked with the configured leeway.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::domain::foundation::{AuthError, UserId};
use crate::ports::SessionValidator;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: String,
    pub exp: u64,
}

/// Validates HS256-signed access tokens.
pub struct JwtSessionValidator {
    secret: Secret<String>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionValidator {
    pub fn new(secret: Secret<String>, leeway_secs: u64) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            secret,
            decoding_key,
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.clone(), config.leeway_secs)
    }

    /// Signs a token for `user_id` expiring at `exp` (seconds since epoch).
    ///
    /// Issuance belongs to the surrounding service; this exists for local
    /// tooling and tests.
    pub fn sign(&self, user_id: &UserId, exp: u64) -> Result<String, AuthError> {
        let claims = AccessClaims {
            user_id: user_id.as_str().to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| AuthError::service_unavailable(format!("signing failed: {}", e)))
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        tracing::debug!("Token expired");
                        AuthError::TokenExpired
                    }
                    _ => {
                        tracing::warn!("Token validation failed: {}", e);
                        AuthError::InvalidToken
                    }
                }
            },
        )?;

        UserId::new(data.claims.user_id).map_err(|_| {
            tracing::warn!("Token carries an empty userId");
            AuthError::InvalidToken
        })
    }
}
