//! The authenticated principal behind a request.

use crate::{
    auth::tokens::{self, TokenClass},
    config::Config,
    errors::{Error, Result},
    types::UserId,
};
use axum::http::{header, HeaderMap};
use tracing::trace;

/// The identity carried by a verified access token. Producing this value does
/// not touch the database; liveness of the account is re-checked by the
/// handlers that care.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub role: String,
}

/// Pull the bearer token out of the Authorization header. Missing and
/// malformed headers are both 401s: the endpoints that read a bearer
/// credential have no anonymous mode.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let auth_header = headers.get(header::AUTHORIZATION).ok_or(Error::Unauthorized { message: None })?;

    let auth_str = auth_header.to_str().map_err(|e| {
        trace!("Authorization header is not valid UTF-8: {e}");
        Error::Unauthorized { message: None }
    })?;

    auth_str.strip_prefix("Bearer ").ok_or(Error::Unauthorized { message: None })
}

/// Verify the bearer credential as an access token and produce the principal.
/// Handlers call this before any use-case logic runs, so authentication
/// failures follow the same audit and envelope path as every other failure.
pub(crate) fn principal_from_bearer(headers: &HeaderMap, config: &Config) -> Result<Principal> {
    let token = bearer_token(headers)?;
    let claims = tokens::verify_session_token(token, TokenClass::Access, config)?;

    Ok(Principal {
        user_id: claims.sub,
        role: claims.role,
    })
}
