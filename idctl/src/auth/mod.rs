//! Token minting, verification, and the authenticated principal.

pub mod principal;
pub mod tokens;

pub(crate) use principal::{bearer_token, principal_from_bearer};
pub use principal::Principal;
pub use tokens::{issue_token_pair, verify_session_token, IssuedTokens, SessionClaims, TokenClass};
