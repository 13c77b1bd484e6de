use crate::db::errors::Result;
use crate::db::models::roles::RoleDBResponse;
use sqlx::PgConnection;
use tracing::instrument;

/// Read-only access to role reference data. Roles are seeded by migration and
/// never created through the API, so this repository has no write path.
pub struct Roles<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up an active role by display name. Names are unique per role_type;
    /// session-switchable roles are all client-typed so a bare name lookup
    /// scoped to active rows is unambiguous in practice.
    #[instrument(skip(self), err)]
    pub async fn find_by_name(&mut self, name: &str) -> Result<Option<RoleDBResponse>> {
        let role = sqlx::query_as::<_, RoleDBResponse>(
            "SELECT id, name, role_type, is_active FROM roles WHERE name = $1 AND is_active",
        )
        .bind(name)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(role)
    }
}
