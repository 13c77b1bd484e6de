use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::models::roles::RoleDBResponse;
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse};
use crate::types::{abbrev_uuid, RoleId, UserId};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;

    #[instrument(skip(self, request), fields(mobile_number = %request.mobile_number), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, mobile_number, email, first_name, last_name, registration_number, account_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.mobile_number)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.registration_number)
        .bind(&request.account_type)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up the active account registered under a mobile number.
    /// Deactivated accounts are invisible here; their identifiers are free
    /// for re-registration.
    #[instrument(skip(self, mobile_number), err)]
    pub async fn find_active_by_mobile(&mut self, mobile_number: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE mobile_number = $1 AND is_active")
            .bind(mobile_number)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Combined uniqueness probe for signup: one query over all three
    /// identifying fields. Callers disambiguate which field collided from the
    /// returned rows.
    #[instrument(skip(self, mobile_number, email, registration_number), err)]
    pub async fn find_active_by_identifiers(
        &mut self,
        mobile_number: &str,
        email: &str,
        registration_number: Option<&str>,
    ) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            r#"
            SELECT * FROM users
            WHERE is_active
              AND (mobile_number = $1
                   OR LOWER(email) = LOWER($2)
                   OR ($3::text IS NOT NULL AND registration_number = $3))
            "#,
        )
        .bind(mobile_number)
        .bind(email)
        .bind(registration_number)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    /// All active roles assigned to a user
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn roles_for_user(&mut self, user_id: UserId) -> Result<Vec<RoleDBResponse>> {
        let roles = sqlx::query_as::<_, RoleDBResponse>(
            r#"
            SELECT r.id, r.name, r.role_type, r.is_active
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1 AND r.is_active
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(roles)
    }

    /// Whether a user holds the given role
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), role_id = %abbrev_uuid(&role_id)), err)]
    pub async fn has_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_roles WHERE user_id = $1 AND role_id = $2",
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count > 0)
    }

    /// Assign a role to a user. Idempotent: re-assigning an already-held role
    /// is a no-op rather than an error.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), role_id = %abbrev_uuid(&role_id)), err)]
    pub async fn assign_role(&mut self, user_id: UserId, role_id: RoleId, assigned_by: Option<UserId>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(assigned_by)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful authentication
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn touch_last_login(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}
