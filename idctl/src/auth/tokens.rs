//! JWT session token creation and verification.
//!
//! Sessions are carried by a pair of HS256 tokens signed with the same
//! secret: a short-lived access token presented on API calls and a long-lived
//! refresh token used only to mint new access tokens. The `class` claim keeps
//! the two interchangeable-looking tokens from being used in each other's
//! place.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::Config, errors::Error, types::UserId};

/// Which half of the token pair a JWT is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,       // Subject (user ID)
    pub role: String,      // Active role for this session
    pub class: TokenClass, // Access or refresh
    pub exp: i64,          // Expiration time
    pub iat: i64,          // Issued at
}

impl SessionClaims {
    /// Create new session claims; the lifetime is chosen by token class
    pub fn new(user_id: UserId, role: &str, class: TokenClass, config: &Config) -> Self {
        let now = Utc::now();
        let lifetime = match class {
            TokenClass::Access => config.auth.access_token_lifetime,
            TokenClass::Refresh => config.auth.refresh_token_lifetime,
        };
        let exp = now + lifetime;

        Self {
            sub: user_id,
            role: role.to_string(),
            class,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// A freshly minted access/refresh pair. The refresh expiry is carried
/// alongside so the persisted row matches the claim exactly.
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

fn sign(claims: &SessionClaims, config: &Config) -> Result<String, Error> {
    let key = EncodingKey::from_secret(config.secret_key.as_bytes());
    encode(&Header::default(), claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Create a single session token of the given class
pub fn create_session_token(user_id: UserId, role: &str, class: TokenClass, config: &Config) -> Result<String, Error> {
    sign(&SessionClaims::new(user_id, role, class, config), config)
}

/// Mint the access/refresh pair issued on signup, login, and role switch
pub fn issue_token_pair(user_id: UserId, role: &str, config: &Config) -> Result<IssuedTokens, Error> {
    let access_token = create_session_token(user_id, role, TokenClass::Access, config)?;

    let refresh_claims = SessionClaims::new(user_id, role, TokenClass::Refresh, config);
    let refresh_expires_at = DateTime::from_timestamp(refresh_claims.exp, 0).ok_or_else(|| Error::Internal {
        operation: "compute refresh expiry".to_string(),
    })?;
    let refresh_token = sign(&refresh_claims, config)?;

    Ok(IssuedTokens {
        access_token,
        refresh_token,
        refresh_expires_at,
    })
}

/// Verify and decode a session token, requiring a specific class.
///
/// A structurally valid token of the wrong class is rejected the same way a
/// forged one is: presenting a refresh token where an access token belongs
/// (or vice versa) is a client error, never a pass.
pub fn verify_session_token(token: &str, expected_class: TokenClass, config: &Config) -> Result<SessionClaims, Error> {
    let key = DecodingKey::from_secret(config.secret_key.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthorized { message: None },

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        // Catch-all for any future error variants (default to server error for safety)
        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    if token_data.claims.class != expected_class {
        return Err(Error::Unauthorized {
            message: Some("Invalid token type".to_string()),
        });
    }

    Ok(token_data.claims)
}
