pub mod refresh_tokens;
pub mod roles;
pub mod users;
