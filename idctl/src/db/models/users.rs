//! Database models for users.

use crate::api::models::auth::SignupRequest;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub mobile_number: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub registration_number: Option<String>,
    pub account_type: String,
}

impl From<SignupRequest> for UserCreateDBRequest {
    fn from(api: SignupRequest) -> Self {
        Self {
            mobile_number: api.mobile_number,
            email: api.email,
            first_name: api.first_name,
            last_name: api.last_name,
            registration_number: api.registration_number,
            account_type: "client".to_string(), // Self-service signup never creates internal accounts
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub mobile_number: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub registration_number: Option<String>,
    pub account_type: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
