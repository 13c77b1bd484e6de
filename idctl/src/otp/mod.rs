//! OTP provider abstraction layer
//!
//! This module defines the `OtpProvider` trait which abstracts the external
//! one-time-passcode delivery and verification service. The orchestration
//! layer only sees the two-method contract; which provider backs it is a
//! deployment decision made in configuration.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::OtpConfig;

pub mod http;
pub mod static_code;

/// Create an OTP provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: OtpConfig) -> Arc<dyn OtpProvider> {
    match config {
        OtpConfig::Http(http_config) => Arc::new(http::HttpOtpProvider::from(http_config)),
        OtpConfig::Static(static_config) => Arc::new(static_code::StaticOtpProvider::from(static_config)),
    }
}

/// Result type for OTP provider operations
pub type Result<T> = std::result::Result<T, OtpError>;

/// Errors that can occur during OTP delivery and verification
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid OTP")]
    InvalidCode,

    #[error("OTP has expired")]
    Expired,

    #[error("Too many incorrect attempts, please request a new OTP")]
    RateLimited,

    #[error("Invalid OTP request: {0}")]
    InvalidData(String),

    #[error("OTP provider error: {0}")]
    ProviderApi(String),
}

impl From<OtpError> for crate::errors::Error {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidCode | OtpError::Expired => crate::errors::Error::Unauthorized {
                message: Some(err.to_string()),
            },
            OtpError::RateLimited => crate::errors::Error::RateLimited {
                message: err.to_string(),
            },
            OtpError::InvalidData(message) => crate::errors::Error::Validation { message },
            OtpError::ProviderApi(operation) => crate::errors::Error::Upstream { operation },
        }
    }
}

/// The provider-side handle for an OTP round trip. The verification id must
/// be echoed back by the client on signup/login so verify can address the
/// same challenge.
#[derive(Debug, Clone)]
pub struct OtpDelivery {
    pub verification_id: String,
    pub timeout_seconds: u64,
}

/// Abstract OTP provider interface
#[async_trait]
pub trait OtpProvider: Send + Sync {
    /// Deliver a one-time passcode to the given mobile number
    async fn send_otp(&self, mobile_number: &str) -> Result<OtpDelivery>;

    /// Check a submitted code against a previously issued challenge.
    /// Returns Ok(()) only for an explicit, completed verification; every
    /// other provider outcome is an error (fail-closed).
    async fn verify_otp(&self, verification_id: &str, code: &str) -> Result<()>;
}
