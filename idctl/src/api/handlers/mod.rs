//! Request handlers for the authentication API.

pub mod auth;
