//! Static-code OTP provider.
//!
//! Compares submitted codes against a fixed value with no network round
//! trip. Used for local development and deployments where the delivery
//! channel is provisioned out of band.

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::config::StaticOtpConfig;
use crate::otp::{OtpDelivery, OtpError, OtpProvider, Result};

pub struct StaticOtpProvider {
    config: StaticOtpConfig,
}

impl From<StaticOtpConfig> for StaticOtpProvider {
    fn from(config: StaticOtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OtpProvider for StaticOtpProvider {
    #[instrument(skip(self, mobile_number), err)]
    async fn send_otp(&self, mobile_number: &str) -> Result<OtpDelivery> {
        if mobile_number.is_empty() {
            return Err(OtpError::InvalidData("mobile number is required".to_string()));
        }

        // Nothing is delivered; the verification id only exists so the
        // send/verify round trip has the same shape as the HTTP provider.
        Ok(OtpDelivery {
            verification_id: Uuid::new_v4().to_string(),
            timeout_seconds: 60,
        })
    }

    #[instrument(skip(self, code), err)]
    async fn verify_otp(&self, _verification_id: &str, code: &str) -> Result<()> {
        if code == self.config.code {
            Ok(())
        } else {
            Err(OtpError::InvalidCode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticOtpProvider {
        StaticOtpProvider::from(StaticOtpConfig {
            code: "1234".to_string(),
        })
    }

    #[tokio::test]
    async fn test_matching_code_verifies() {
        let provider = provider();
        let delivery = provider.send_otp("9876543210").await.unwrap();
        assert!(provider.verify_otp(&delivery.verification_id, "1234").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_code_is_invalid() {
        let provider = provider();
        let result = provider.verify_otp("any", "0000").await;
        assert!(matches!(result, Err(OtpError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_send_requires_mobile_number() {
        let provider = provider();
        assert!(matches!(provider.send_otp("").await, Err(OtpError::InvalidData(_))));
    }
}
