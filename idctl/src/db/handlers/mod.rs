//! Repository implementations, one per table.

pub mod refresh_tokens;
pub mod repository;
pub mod roles;
pub mod users;

pub use refresh_tokens::RefreshTokens;
pub use repository::Repository;
pub use roles::Roles;
pub use users::Users;
