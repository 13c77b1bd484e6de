use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::models::refresh_tokens::{RefreshTokenDBResponse, RefreshTokenUpsertDBRequest};
use crate::types::{abbrev_uuid, RefreshTokenId, UserId};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct RefreshTokens<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for RefreshTokens<'c> {
    type CreateRequest = RefreshTokenUpsertDBRequest;
    type Response = RefreshTokenDBResponse;
    type Id = RefreshTokenId;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, RefreshTokenDBResponse>(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token, expires_at, device_id, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.token)
        .bind(request.expires_at)
        .bind(&request.device_id)
        .bind(&request.user_agent)
        .bind(&request.ip_address)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self), fields(refresh_token_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let token = sqlx::query_as::<_, RefreshTokenDBResponse>("SELECT * FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }
}

impl<'c> RefreshTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Issue a refresh token for a (user, device) pair, rotating in place.
    ///
    /// Active rows for the pair are overwritten with the new token and expiry,
    /// which invalidates whatever token the row held before. When no active
    /// row exists a fresh one is inserted. `device_id` is compared with
    /// IS NOT DISTINCT FROM so device-less sessions rotate a single NULL-device
    /// row instead of accumulating one per login.
    ///
    /// There is no unique index on (user_id, device_id): two racing logins may
    /// both miss the UPDATE and insert two rows. Both are valid sessions, and
    /// the next rotation collapses whichever rows remain active.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn rotate_or_create(&mut self, request: &RefreshTokenUpsertDBRequest) -> Result<RefreshTokenDBResponse> {
        let rotated = sqlx::query_as::<_, RefreshTokenDBResponse>(
            r#"
            UPDATE refresh_tokens
            SET token = $3,
                expires_at = $4,
                user_agent = $5,
                ip_address = $6,
                last_used_at = NULL,
                revoked_reason = NULL,
                updated_at = NOW()
            WHERE user_id = $1
              AND device_id IS NOT DISTINCT FROM $2
              AND is_active
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.device_id)
        .bind(&request.token)
        .bind(request.expires_at)
        .bind(&request.user_agent)
        .bind(&request.ip_address)
        .fetch_all(&mut *self.db)
        .await?;

        match rotated.into_iter().next() {
            Some(token) => Ok(token),
            None => self.create(request).await,
        }
    }

    /// Look up a presented token, filtered to live rows only. Revoked or
    /// expired rows are not returned, so a miss here means the token must be
    /// rejected regardless of its cryptographic validity.
    #[instrument(skip(self, token), err)]
    pub async fn find_live_by_token(&mut self, token: &str) -> Result<Option<RefreshTokenDBResponse>> {
        let found = sqlx::query_as::<_, RefreshTokenDBResponse>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE token = $1 AND is_active AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(found)
    }

    /// Deactivate the active row holding this token for this user. Returns
    /// false when no such row exists, which callers surface as a conflict
    /// rather than silently succeeding.
    #[instrument(skip(self, token), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn revoke(&mut self, user_id: UserId, token: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_active = FALSE, revoked_reason = $3, updated_at = NOW()
            WHERE user_id = $1 AND token = $2 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(reason)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that a token was presented and accepted
    #[instrument(skip(self), fields(refresh_token_id = %abbrev_uuid(&id)), err)]
    pub async fn touch_last_used(&mut self, id: RefreshTokenId) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}
