//! HTTP OTP provider.
//!
//! Talks to an external verification service over three endpoints:
//! authenticate (exchanging the customer id and key for a short-lived
//! credential), send, and validate. The credential is cached per provider
//! instance and refreshed shortly before it expires; a rejection from the
//! provider drops the cache so the next call re-authenticates.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::HttpOtpConfig;
use crate::otp::{OtpDelivery, OtpError, OtpProvider, Result};

/// Refresh the cached credential this long before its stated expiry
const CREDENTIAL_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Provider response codes for validateOtp failures
const CODE_INVALID_OTP: i64 = 702;
const CODE_MAX_ATTEMPTS: i64 = 703;
const CODE_EXPIRED_OTP: i64 = 705;

#[derive(Debug, Clone)]
struct CachedCredential {
    token: String,
    expires_at: Instant,
}

impl CachedCredential {
    fn is_fresh(&self) -> bool {
        Instant::now() + CREDENTIAL_REFRESH_MARGIN < self.expires_at
    }
}

pub struct HttpOtpProvider {
    config: HttpOtpConfig,
    client: reqwest::Client,
    credential: Mutex<Option<CachedCredential>>,
}

impl From<HttpOtpConfig> for HttpOtpProvider {
    fn from(config: HttpOtpConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            credential: Mutex::new(None),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateResponse {
    token: String,
    #[serde(default = "default_credential_lifetime")]
    expires_in_seconds: u64,
}

fn default_credential_lifetime() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderEnvelope {
    #[serde(default)]
    response_code: Option<i64>,
    #[serde(default)]
    data: Option<ProviderData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderData {
    #[serde(default)]
    verification_id: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    verification_status: Option<String>,
}

impl HttpOtpProvider {
    /// Return the cached provider credential, re-authenticating when the
    /// cache is empty or within the refresh margin of expiring. The mutex is
    /// held across the refresh so concurrent callers do not stampede the
    /// authenticate endpoint.
    async fn credential(&self) -> Result<String> {
        let mut cached = self.credential.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh() {
                return Ok(credential.token.clone());
            }
            debug!("OTP provider credential near expiry, re-authenticating");
        }

        let url = format!("{}auth/v1/authenticate", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("customerId", self.config.customer_id.as_str()), ("key", self.config.key.as_str())])
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("authenticate request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OtpError::ProviderApi(format!(
                "authenticate returned {}",
                response.status()
            )));
        }

        let auth: AuthenticateResponse = response
            .json()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("authenticate response malformed: {e}")))?;

        let credential = CachedCredential {
            token: auth.token.clone(),
            expires_at: Instant::now() + Duration::from_secs(auth.expires_in_seconds),
        };
        *cached = Some(credential);

        Ok(auth.token)
    }

    /// Drop the cached credential. Called when the provider signals that the
    /// credential it was shown is no longer valid.
    async fn invalidate_credential(&self) {
        let mut cached = self.credential.lock().await;
        *cached = None;
    }
}

#[async_trait]
impl OtpProvider for HttpOtpProvider {
    #[instrument(skip(self, mobile_number), err)]
    async fn send_otp(&self, mobile_number: &str) -> Result<OtpDelivery> {
        if mobile_number.is_empty() {
            return Err(OtpError::InvalidData("mobile number is required".to_string()));
        }

        let token = self.credential().await?;

        let url = format!("{}verification/v3/send", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("authToken", &token)
            .query(&[
                ("countryCode", self.config.country_code.as_str()),
                ("customerId", self.config.customer_id.as_str()),
                ("mobileNumber", mobile_number),
                ("flowType", self.config.channel.as_str()),
                ("otpLength", &self.config.code_length.to_string()),
            ])
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("send request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("OTP provider rejected cached credential on send");
            self.invalidate_credential().await;
            return Err(OtpError::ProviderApi("provider rejected credential".to_string()));
        }
        if !response.status().is_success() {
            return Err(OtpError::ProviderApi(format!("send returned {}", response.status())));
        }

        let envelope: ProviderEnvelope = response
            .json()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("send response malformed: {e}")))?;

        let data = envelope
            .data
            .ok_or_else(|| OtpError::ProviderApi("send response missing data".to_string()))?;
        let verification_id = data
            .verification_id
            .ok_or_else(|| OtpError::ProviderApi("send response missing verification id".to_string()))?;
        let timeout_seconds = data.timeout.as_deref().and_then(|t| t.parse().ok()).unwrap_or(60);

        Ok(OtpDelivery {
            verification_id,
            timeout_seconds,
        })
    }

    #[instrument(skip(self, code), err)]
    async fn verify_otp(&self, verification_id: &str, code: &str) -> Result<()> {
        let token = self.credential().await?;

        let url = format!("{}verification/v3/validateOtp", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("authToken", &token)
            .query(&[("verificationId", verification_id), ("code", code)])
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("verify request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("OTP provider rejected cached credential on verify");
            self.invalidate_credential().await;
            return Err(OtpError::ProviderApi("provider rejected credential".to_string()));
        }

        let http_success = response.status().is_success();
        let envelope: ProviderEnvelope = response
            .json()
            .await
            .map_err(|e| OtpError::ProviderApi(format!("verify response malformed: {e}")))?;

        match envelope.response_code {
            Some(CODE_INVALID_OTP) => return Err(OtpError::InvalidCode),
            Some(CODE_EXPIRED_OTP) => return Err(OtpError::Expired),
            Some(CODE_MAX_ATTEMPTS) => return Err(OtpError::RateLimited),
            _ => {}
        }

        // Success needs both a 2xx status and an explicit completed marker.
        // A 2xx with any other (or missing) verification status is a failure.
        let status = envelope.data.and_then(|d| d.verification_status);
        match (http_success, status.as_deref()) {
            (true, Some("VERIFICATION_COMPLETED")) => Ok(()),
            (true, other) => Err(OtpError::ProviderApi(format!(
                "verification not completed (status {other:?})"
            ))),
            (false, _) => Err(OtpError::ProviderApi("verify request was not successful".to_string())),
        }
    }
}
