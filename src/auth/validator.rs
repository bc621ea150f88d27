//! Bearer-token validators for the WebSocket handshake.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::error::GatewayError;

/// Validates a bearer access token and extracts the user identity.
///
/// Implemented by whatever the CRUD layer issues tokens with; the gateway
/// calls it once per handshake and never afterwards.
#[async_trait]
pub trait TokenValidator: Send + Sync + std::fmt::Debug {
    /// Validates `token` and returns the user it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotAuthenticated`] if the token is missing
    /// a valid signature, expired, or otherwise rejected.
    async fn validate(&self, token: &str) -> Result<UserId, GatewayError>;
}

/// JWT claims payload expected in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the user ID.
    pub sub: uuid::Uuid,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

/// Validates HS256-signed JWT access tokens against a shared secret.
#[derive(Clone)]
pub struct JwtValidator {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtValidator {
    /// Creates a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 5; // seconds of clock-skew tolerance

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<UserId, GatewayError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    GatewayError::NotAuthenticated("token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    GatewayError::NotAuthenticated("invalid token format".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    GatewayError::NotAuthenticated("invalid token signature".to_string())
                }
                _ => GatewayError::NotAuthenticated(format!("token validation failed: {e}")),
            })?;

        Ok(UserId::from_uuid(token_data.claims.sub))
    }
}

/// Fixed token → user lookup table.
///
/// Stands in for the CRUD layer's validator in tests and local setups.
#[derive(Debug, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenValidator {
    /// Creates an empty validator that rejects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token → user mapping.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, GatewayError> {
        self.tokens
            .get(token)
            .copied()
            .ok_or_else(|| GatewayError::NotAuthenticated("unknown token".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn issue(sub: uuid::Uuid, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub,
            iat: now,
            exp: now + exp_offset_secs,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .ok();
        let Some(token) = token else {
            panic!("token encoding failed");
        };
        token
    }

    #[tokio::test]
    async fn valid_token_yields_user_id() {
        let user = uuid::Uuid::new_v4();
        let validator = JwtValidator::new(SECRET);
        let result = validator.validate(&issue(user, 3600)).await;
        let Ok(user_id) = result else {
            panic!("expected valid token to be accepted");
        };
        assert_eq!(*user_id.as_uuid(), user);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let validator = JwtValidator::new(SECRET);
        let result = validator.validate(&issue(uuid::Uuid::new_v4(), -3600)).await;
        assert!(matches!(result, Err(GatewayError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let validator = JwtValidator::new("other-secret");
        let result = validator.validate(&issue(uuid::Uuid::new_v4(), 3600)).await;
        assert!(matches!(result, Err(GatewayError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let validator = JwtValidator::new(SECRET);
        let result = validator.validate("not-a-jwt").await;
        assert!(matches!(result, Err(GatewayError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn static_validator_looks_up_tokens() {
        let user = UserId::from_uuid(uuid::Uuid::new_v4());
        let validator = StaticTokenValidator::new().with_token("tok-a", user);

        let ok = validator.validate("tok-a").await;
        assert_eq!(ok.ok(), Some(user));

        let err = validator.validate("tok-b").await;
        assert!(matches!(err, Err(GatewayError::NotAuthenticated(_))));
    }
}
