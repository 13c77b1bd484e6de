//! Database layer: models, repositories, and error classification.

pub mod errors;
pub mod handlers;
pub mod models;
