//! Session validation port for access token validation.
//!
//! This port defines the contract for validating access tokens and extracting
//! user identity. The WebSocket handshake and the HTTP history routes both go
//! through it, so neither cares how tokens are issued or signed.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};

/// Validates access tokens and extracts user identity.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature
/// - Validate the expiry claim
/// - Return `AuthError::InvalidToken` for malformed/bad signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate an access token and return the user it belongs to.
    ///
    /// # Arguments
    ///
    /// * `token` - The raw token (without "Bearer " prefix)
    async fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedValidator;

    #[async_trait]
    impl SessionValidator for FixedValidator {
        async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
            if token == "good" {
                Ok(UserId::new("user-1").unwrap())
            } else {
                Err(AuthError::InvalidToken)
            }
        }
    }

    #[tokio::test]
    async fn validator_is_usable_as_trait_object() {
        let validator: &dyn SessionValidator = &FixedValidator;
        assert_eq!(validator.validate("good").await.unwrap().as_str(), "user-1");
        assert_eq!(
            validator.validate("bad").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }
}
