//! Authentication request and response payloads.
//!
//! Request bodies are camelCase on the wire. Each use case has its own
//! request schema with explicit required/optional fields, validated at the
//! boundary before any domain logic runs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{Error, Result};
use crate::otp::OtpDelivery;
use crate::types::UserId;

/// Request an OTP delivery to a mobile number
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub mobile_number: String,
}

/// Handle for the send→verify round trip. The client echoes the verification
/// id back on signup/login together with the code the user received.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpData {
    pub verification_id: String,
    pub timeout_seconds: u64,
}

impl From<OtpDelivery> for SendOtpData {
    fn from(delivery: OtpDelivery) -> Self {
        Self {
            verification_id: delivery.verification_id,
            timeout_seconds: delivery.timeout_seconds,
        }
    }
}

/// Create a new account, gated on a verified OTP
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub mobile_number: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub registration_number: Option<String>,
    /// Role to grant on signup; defaults to the configured client role
    #[serde(default)]
    pub role: Option<String>,
    pub verification_id: String,
    pub otp: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    #[schema(value_type = uuid::Uuid)]
    pub user_id: UserId,
    pub role: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Authenticate an existing account, gated on a verified OTP
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub mobile_number: String,
    pub verification_id: String,
    pub otp: String,
    /// Role to activate for this session; may grant a not-yet-held client role
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[schema(value_type = uuid::Uuid)]
    pub user_id: UserId,
    pub role: String,
    pub available_roles: Vec<String>,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub role: String,
    pub access_token: String,
}

/// Activate a different held role for the current session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRoleRequest {
    pub role: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRoleData {
    pub previous_role: String,
    pub role: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Mobile numbers are canonical 10-digit local format, no country prefix.
pub fn validate_mobile_number(mobile_number: &str) -> Result<()> {
    if mobile_number.len() == 10 && mobile_number.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::Validation {
            message: "Mobile number must be exactly 10 digits".to_string(),
        })
    }
}

/// Syntactic email check. Deliverability is not our problem; this only
/// rejects obviously malformed addresses before they hit the unique index.
pub fn validate_email(email: &str) -> Result<()> {
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains("..")
    });

    if well_formed {
        Ok(())
    } else {
        Err(Error::Validation {
            message: "Email address is not valid".to_string(),
        })
    }
}
