//! API request and response data models.
//!
//! These structures define the public API contract and are distinct from the
//! database models, so the wire format and the storage representation can
//! evolve independently. All models carry `utoipa` annotations for the
//! generated API documentation.

pub mod auth;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Uniform response envelope wrapped around every endpoint's payload.
///
/// Errors ship the same shape with `success = false` and `data = null`, so
/// clients can branch on one field regardless of status code.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = ApiEnvelope::success("Login successful", serde_json::json!({"role": "Broker"}));
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Login successful");
        assert_eq!(json["data"]["role"], "Broker");
    }

    #[test]
    fn test_failure_envelope_has_null_data() {
        let envelope = ApiEnvelope::<serde_json::Value>::failure("Account does not exist, please sign up first");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
    }
}
