//! Database models for role reference data.

use crate::types::RoleId;
use sqlx::FromRow;

/// Database response for a role
#[derive(Debug, Clone, FromRow)]
pub struct RoleDBResponse {
    pub id: RoleId,
    pub name: String,
    pub role_type: String,
    pub is_active: bool,
}

impl RoleDBResponse {
    /// Client roles are the only roles a session may be switched to
    pub fn is_client_role(&self) -> bool {
        self.role_type == "client"
    }
}
