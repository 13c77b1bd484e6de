//! Database models for persisted refresh tokens.

use crate::types::{RefreshTokenId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for issuing a refresh token. The same request drives both
/// sides of rotate-or-create: an existing active row for the (user, device)
/// pair is overwritten in place, otherwise a fresh row is inserted.
#[derive(Debug, Clone)]
pub struct RefreshTokenUpsertDBRequest {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Database response for a refresh token row. Liveness (active and unexpired)
/// is decided in SQL by `RefreshTokens::find_live_by_token`, never re-derived
/// from these fields.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenDBResponse {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
