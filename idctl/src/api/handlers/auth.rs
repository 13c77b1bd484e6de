//! Authentication use cases: send-otp, signup, login, refresh, logout and
//! switch-role.
//!
//! Each handler is one orchestrated unit of work: validate input, gate on the
//! OTP provider where the use case requires it, then read/write the identity
//! and token repositories inside a single transaction. Every outcome, success
//! or failure, is converted to the `{success, message, data}` envelope at the
//! handler boundary and emits exactly one audit record; no raw error reaches
//! the transport.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::{
    api::models::{
        auth::{
            validate_email, validate_mobile_number, LoginData, LoginRequest, RefreshData, SendOtpData, SendOtpRequest, SignupData,
            SignupRequest, SwitchRoleData, SwitchRoleRequest,
        },
        ApiEnvelope,
    },
    audit::{redact_request, AuditRecord},
    auth::{bearer_token, principal_from_bearer, tokens, TokenClass},
    config::Config,
    db::{
        handlers::{RefreshTokens, Repository, Roles, Users},
        models::{refresh_tokens::RefreshTokenUpsertDBRequest, roles::RoleDBResponse, users::UserCreateDBRequest},
    },
    errors::{Error, Result},
    types::UserId,
    AppState,
};

/// A finished use case, ready to be enveloped and audited
struct Completed<T> {
    status: StatusCode,
    message: &'static str,
    user_id: Option<UserId>,
    data: T,
}

/// Convert a use-case outcome into the response envelope and emit the single
/// audit record for the request. The failure arm defers to
/// [`Error::into_response`] so severity-tiered logging stays in one place.
fn finish<T: Serialize>(
    state: &AppState,
    endpoint: &'static str,
    request_body: Value,
    started: Instant,
    result: Result<Completed<T>>,
) -> Response {
    let duration_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(completed) => {
            let envelope = ApiEnvelope::success(completed.message, completed.data);
            let response_body = serde_json::to_value(&envelope).unwrap_or(Value::Null);

            state.audit.record(AuditRecord {
                user_id: completed.user_id,
                endpoint,
                request_body: redact_request(&request_body, true),
                status_code: completed.status.as_u16(),
                response_body,
                duration_ms,
                error: None,
                detail: None,
            });

            (completed.status, Json(envelope)).into_response()
        }
        Err(error) => {
            let envelope = ApiEnvelope::<Value>::failure(error.user_message());
            let response_body = serde_json::to_value(&envelope).unwrap_or(Value::Null);

            state.audit.record(AuditRecord {
                user_id: None,
                endpoint,
                request_body: redact_request(&request_body, false),
                status_code: error.status_code().as_u16(),
                response_body,
                duration_ms,
                error: Some(error.user_message()),
                detail: Some(format!("{error:#}")),
            });

            error.into_response()
        }
    }
}

/// Connection metadata persisted alongside refresh tokens
fn client_metadata(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    // First hop of X-Forwarded-For; absent when we face the client directly
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    (user_agent, ip_address)
}

/// Resolve a requested role name to an active, switchable client role.
/// Unknown, inactive, or non-client roles are a validation error rather than
/// a silent fallback to the default.
async fn resolve_client_role(conn: &mut sqlx::PgConnection, config: &Config, name: &str) -> Result<RoleDBResponse> {
    if !config.auth.allowed_client_roles.iter().any(|allowed| allowed == name) {
        return Err(Error::Validation {
            message: format!("Unknown or unavailable role: {name}"),
        });
    }

    match Roles::new(conn).find_by_name(name).await? {
        Some(role) if role.is_client_role() => Ok(role),
        _ => Err(Error::Validation {
            message: format!("Unknown or unavailable role: {name}"),
        }),
    }
}

/// Deliver an OTP to a mobile number
#[utoipa::path(
    post,
    path = "/auth/v1/otp",
    request_body = SendOtpRequest,
    tag = "auth",
    responses(
        (status = 200, description = "OTP sent", body = ApiEnvelope<SendOtpData>),
        (status = 400, description = "Invalid mobile number"),
        (status = 502, description = "OTP provider unavailable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn send_otp(State(state): State<AppState>, Json(request): Json<SendOtpRequest>) -> Response {
    let started = Instant::now();
    let request_body = serde_json::to_value(&request).unwrap_or(Value::Null);

    let result = run_send_otp(&state, request).await;
    finish(&state, "/auth/v1/otp", request_body, started, result)
}

async fn run_send_otp(state: &AppState, request: SendOtpRequest) -> Result<Completed<SendOtpData>> {
    validate_mobile_number(&request.mobile_number)?;

    let delivery = state.otp.send_otp(&request.mobile_number).await?;

    Ok(Completed {
        status: StatusCode::OK,
        message: "OTP sent successfully",
        user_id: None,
        data: SendOtpData::from(delivery),
    })
}

/// Create an account, gated on a verified OTP
#[utoipa::path(
    post,
    path = "/auth/v1/signup",
    request_body = SignupRequest,
    tag = "auth",
    responses(
        (status = 201, description = "Account created", body = ApiEnvelope<SignupData>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "OTP verification failed"),
        (status = 409, description = "Identifier already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<SignupRequest>) -> Response {
    let started = Instant::now();
    let request_body = serde_json::to_value(&request).unwrap_or(Value::Null);

    let result = run_signup(&state, &headers, request).await;
    finish(&state, "/auth/v1/signup", request_body, started, result)
}

async fn run_signup(state: &AppState, headers: &HeaderMap, mut request: SignupRequest) -> Result<Completed<SignupData>> {
    // A blank registration number is no registration number; storing "" would
    // occupy the partial unique index and block every later blank signup.
    request.registration_number = request
        .registration_number
        .take()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    validate_mobile_number(&request.mobile_number)?;
    validate_email(&request.email)?;
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(Error::Validation {
            message: "First name and last name are required".to_string(),
        });
    }
    if request.verification_id.is_empty() || request.otp.is_empty() {
        return Err(Error::Validation {
            message: "OTP verification details are required".to_string(),
        });
    }

    // Nothing persists before this point; an OTP failure leaves no state.
    state.otp.verify_otp(&request.verification_id, &request.otp).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let mut users = Users::new(&mut tx);
    let collisions = users
        .find_active_by_identifiers(&request.mobile_number, &request.email, request.registration_number.as_deref())
        .await?;
    if !collisions.is_empty() {
        // Disambiguate which identifier collided: email wins over mobile,
        // mobile over registration number.
        let email = request.email.to_lowercase();
        let field = if collisions.iter().any(|u| u.email.to_lowercase() == email) {
            "email"
        } else if collisions.iter().any(|u| u.mobile_number == request.mobile_number) {
            "mobile number"
        } else {
            "registration number"
        };
        return Err(Error::Conflict {
            message: format!("An account with this {field} already exists"),
        });
    }

    let role_name = request.role.clone().unwrap_or_else(|| state.config.auth.default_client_role.clone());
    let role = resolve_client_role(&mut tx, &state.config, &role_name).await?;

    let mut users = Users::new(&mut tx);
    let user = users.create(&UserCreateDBRequest::from(request.clone())).await?;
    users.assign_role(user.id, role.id, None).await?;

    let issued = tokens::issue_token_pair(user.id, &role.name, &state.config)?;

    let (user_agent, ip_address) = client_metadata(headers);
    RefreshTokens::new(&mut tx)
        .rotate_or_create(&RefreshTokenUpsertDBRequest {
            user_id: user.id,
            token: issued.refresh_token.clone(),
            expires_at: issued.refresh_expires_at,
            device_id: request.device_id.clone(),
            user_agent,
            ip_address,
        })
        .await?;

    // User, role assignment and refresh token commit together or not at all
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Completed {
        status: StatusCode::CREATED,
        message: "Signup successful",
        user_id: Some(user.id),
        data: SignupData {
            user_id: user.id,
            role: role.name,
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        },
    })
}

/// Authenticate an existing account, gated on a verified OTP
#[utoipa::path(
    post,
    path = "/auth/v1/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = ApiEnvelope<LoginData>),
        (status = 401, description = "OTP verification failed"),
        (status = 403, description = "Account holds no active role"),
        (status = 404, description = "Account does not exist"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<LoginRequest>) -> Response {
    let started = Instant::now();
    let request_body = serde_json::to_value(&request).unwrap_or(Value::Null);

    let result = run_login(&state, &headers, request).await;
    finish(&state, "/auth/v1/login", request_body, started, result)
}

async fn run_login(state: &AppState, headers: &HeaderMap, request: LoginRequest) -> Result<Completed<LoginData>> {
    validate_mobile_number(&request.mobile_number)?;
    if request.verification_id.is_empty() || request.otp.is_empty() {
        return Err(Error::Validation {
            message: "OTP verification details are required".to_string(),
        });
    }

    state.otp.verify_otp(&request.verification_id, &request.otp).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let mut users = Users::new(&mut tx);
    let user = users
        .find_active_by_mobile(&request.mobile_number)
        .await?
        .ok_or_else(|| Error::NotFound {
            message: "Account does not exist, please sign up first".to_string(),
        })?;

    let held = users.roles_for_user(user.id).await?;
    let mut available: Vec<String> = held.iter().map(|r| r.name.clone()).collect();

    let resolved_role = match &request.role {
        Some(requested) => {
            let role = resolve_client_role(&mut tx, &state.config, requested).await?;
            if !held.iter().any(|r| r.id == role.id) {
                // Login may grant a valid client role the account does not
                // hold yet; switch-role never does.
                Users::new(&mut tx).assign_role(user.id, role.id, None).await?;
                available.push(role.name.clone());
            }
            role.name
        }
        None => match held.first() {
            Some(role) => role.name.clone(),
            None => {
                return Err(Error::Forbidden {
                    message: "No active role assigned to this account".to_string(),
                })
            }
        },
    };

    let issued = tokens::issue_token_pair(user.id, &resolved_role, &state.config)?;

    let (user_agent, ip_address) = client_metadata(headers);
    RefreshTokens::new(&mut tx)
        .rotate_or_create(&RefreshTokenUpsertDBRequest {
            user_id: user.id,
            token: issued.refresh_token.clone(),
            expires_at: issued.refresh_expires_at,
            device_id: request.device_id.clone(),
            user_agent,
            ip_address,
        })
        .await?;
    Users::new(&mut tx).touch_last_login(user.id).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Completed {
        status: StatusCode::OK,
        message: "Login successful",
        user_id: Some(user.id),
        data: LoginData {
            user_id: user.id,
            role: resolved_role,
            available_roles: available,
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        },
    })
}

/// Mint a new access token from a live refresh token
#[utoipa::path(
    post,
    path = "/auth/v1/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Access token refreshed", body = ApiEnvelope<RefreshData>),
        (status = 401, description = "Refresh token missing, invalid, expired or revoked"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    // No body on this endpoint; record the credential's presence, redacted
    let request_body = serde_json::json!({ "refreshToken": bearer_token(&headers).unwrap_or_default() });

    let result = run_refresh(&state, &headers).await;
    finish(&state, "/auth/v1/refresh", request_body, started, result)
}

async fn run_refresh(state: &AppState, headers: &HeaderMap) -> Result<Completed<RefreshData>> {
    let token = bearer_token(headers)?;

    // Two-stage verification: cryptographic validity first, then store
    // liveness. A structurally valid but revoked or superseded token fails
    // the second stage.
    let claims = tokens::verify_session_token(token, TokenClass::Refresh, &state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let row = RefreshTokens::new(&mut conn)
        .find_live_by_token(token)
        .await?
        .filter(|row| row.user_id == claims.sub)
        .ok_or_else(|| Error::Unauthorized {
            message: Some("Session has been revoked or expired".to_string()),
        })?;

    // Re-resolve the account: deactivation after issuance invalidates every
    // outstanding token, structurally valid or not.
    let mut users = Users::new(&mut conn);
    let user = users
        .get_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| Error::Unauthorized {
            message: Some("Account is no longer active".to_string()),
        })?;

    let held = users.roles_for_user(user.id).await?;
    let role = if held.iter().any(|r| r.name == claims.role) {
        claims.role
    } else {
        // Role revoked since issuance: fall back to the first active role
        held.first()
            .map(|r| r.name.clone())
            .ok_or_else(|| Error::Forbidden {
                message: "No active role assigned to this account".to_string(),
            })?
    };

    // Access token only; the refresh token stays client-held and unrotated
    let access_token = tokens::create_session_token(user.id, &role, TokenClass::Access, &state.config)?;
    RefreshTokens::new(&mut conn).touch_last_used(row.id).await?;

    Ok(Completed {
        status: StatusCode::OK,
        message: "Token refreshed",
        user_id: Some(user.id),
        data: RefreshData { role, access_token },
    })
}

/// Revoke the presented refresh token
#[utoipa::path(
    post,
    path = "/auth/v1/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "Refresh token missing or invalid"),
        (status = 409, description = "Session already logged out"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_body = serde_json::json!({ "refreshToken": bearer_token(&headers).unwrap_or_default() });

    let result = run_logout(&state, &headers).await;
    finish(&state, "/auth/v1/logout", request_body, started, result)
}

async fn run_logout(state: &AppState, headers: &HeaderMap) -> Result<Completed<Value>> {
    let token = bearer_token(headers)?;
    let claims = tokens::verify_session_token(token, TokenClass::Refresh, &state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let revoked = RefreshTokens::new(&mut conn).revoke(claims.sub, token, "logout").await?;
    if !revoked {
        // Revoke-miss is a client error, never a silent success
        return Err(Error::Conflict {
            message: "Session is already logged out".to_string(),
        });
    }

    Ok(Completed {
        status: StatusCode::OK,
        message: "Logout successful",
        user_id: Some(claims.sub),
        data: Value::Null,
    })
}

/// Activate a different held role for the current session
#[utoipa::path(
    post,
    path = "/auth/v1/switch-role",
    request_body = SwitchRoleRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Role switched", body = ApiEnvelope<SwitchRoleData>),
        (status = 401, description = "Access token missing or invalid"),
        (status = 403, description = "Role not held, not switchable, or already active"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn switch_role(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<SwitchRoleRequest>) -> Response {
    let started = Instant::now();
    let request_body = serde_json::to_value(&request).unwrap_or(Value::Null);

    let result = run_switch_role(&state, &headers, request).await;
    finish(&state, "/auth/v1/switch-role", request_body, started, result)
}

async fn run_switch_role(state: &AppState, headers: &HeaderMap, request: SwitchRoleRequest) -> Result<Completed<SwitchRoleData>> {
    // The principal is established before any use-case logic runs
    let principal = principal_from_bearer(headers, &state.config)?;

    if !state.config.auth.allowed_client_roles.contains(&request.role) {
        return Err(Error::Forbidden {
            message: format!("Role '{}' is not switchable", request.role),
        });
    }
    if request.role == principal.role {
        return Err(Error::Forbidden {
            message: format!("Role '{}' is already active", request.role),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let mut users = Users::new(&mut tx);
    let user = users
        .get_by_id(principal.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| Error::Unauthorized {
            message: Some("Account is no longer active".to_string()),
        })?;

    let role = Roles::new(&mut tx)
        .find_by_name(&request.role)
        .await?
        .filter(|r| r.is_client_role())
        .ok_or_else(|| Error::Forbidden {
            message: format!("Role '{}' is not switchable", request.role),
        })?;

    if !Users::new(&mut tx).has_role(user.id, role.id).await? {
        // No implicit grant here; login is the only path that adds authority
        return Err(Error::Forbidden {
            message: format!("You do not hold the '{}' role", request.role),
        });
    }

    let issued = tokens::issue_token_pair(user.id, &role.name, &state.config)?;

    let (user_agent, ip_address) = client_metadata(headers);
    RefreshTokens::new(&mut tx)
        .rotate_or_create(&RefreshTokenUpsertDBRequest {
            user_id: user.id,
            token: issued.refresh_token.clone(),
            expires_at: issued.refresh_expires_at,
            device_id: request.device_id.clone(),
            user_agent,
            ip_address,
        })
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Completed {
        status: StatusCode::OK,
        message: "Role switched",
        user_id: Some(user.id),
        data: SwitchRoleData {
            previous_role: principal.role,
            role: role.name,
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::AuditSink,
        build_router,
        config::{Config, OtpConfig, StaticOtpConfig},
        otp::create_provider,
        AppState,
    };
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sqlx::PgPool;

    const TEST_OTP: &str = "1234";

    fn test_server(pool: PgPool) -> TestServer {
        let config = Config {
            secret_key: "test-secret-key-for-handlers".to_string(),
            otp: OtpConfig::Static(StaticOtpConfig {
                code: TEST_OTP.to_string(),
            }),
            ..Default::default()
        };
        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .otp(create_provider(config.otp.clone()))
            .audit(AuditSink::new(pool))
            .build();

        TestServer::new(build_router(state)).expect("Failed to create test server")
    }

    fn signup_body(mobile: &str, email: &str) -> Value {
        json!({
            "mobileNumber": mobile,
            "email": email,
            "firstName": "Asha",
            "lastName": "Patel",
            "verificationId": "v-test",
            "otp": TEST_OTP
        })
    }

    fn login_body(mobile: &str) -> Value {
        json!({
            "mobileNumber": mobile,
            "verificationId": "v-test",
            "otp": TEST_OTP
        })
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_signup_defaults_to_broker_and_issues_distinct_tokens(pool: PgPool) {
        let server = test_server(pool);

        let response = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["role"], "Broker");

        let access = body["data"]["accessToken"].as_str().unwrap();
        let refresh = body["data"]["refreshToken"].as_str().unwrap();
        assert!(!access.is_empty());
        assert_ne!(access, refresh);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_signup_conflicts_naming_the_field(pool: PgPool) {
        let server = test_server(pool);

        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;

        // Same mobile, fresh email: conflict names the mobile number
        let response = server.post("/auth/v1/signup").json(&signup_body("9876543210", "b@x.com")).await;
        response.assert_status(axum::http::StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("mobile number"));

        // Same email takes priority over any other collision
        let response = server.post("/auth/v1/signup").json(&signup_body("9876543211", "A@x.com")).await;
        response.assert_status(axum::http::StatusCode::CONFLICT);
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("email"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_signup_with_wrong_otp_persists_nothing(pool: PgPool) {
        let server = test_server(pool.clone());

        let mut body = signup_body("9876543210", "a@x.com");
        body["otp"] = json!("0000");
        let response = server.post("/auth/v1/signup").json(&body).await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.unwrap();
        assert_eq!(users, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_blank_registration_number_is_stored_as_null_and_never_collides(pool: PgPool) {
        let server = test_server(pool.clone());

        let mut first = signup_body("9876543210", "a@x.com");
        first["registrationNumber"] = json!("");
        server.post("/auth/v1/signup").json(&first).await.assert_status(axum::http::StatusCode::CREATED);

        // A second blank registration number is not a collision
        let mut second = signup_body("9876543211", "b@x.com");
        second["registrationNumber"] = json!("   ");
        server.post("/auth/v1/signup").json(&second).await.assert_status(axum::http::StatusCode::CREATED);

        let stored: Vec<Option<String>> = sqlx::query_scalar("SELECT registration_number FROM users")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.is_none()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_unknown_mobile_is_not_found(pool: PgPool) {
        let server = test_server(pool);

        let response = server.post("/auth/v1/login").json(&login_body("9999999999")).await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);

        let body: Value = response.json();
        assert_eq!(body["message"], "Account does not exist, please sign up first");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_failure_leaves_no_token_state(pool: PgPool) {
        let server = test_server(pool.clone());
        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;
        let tokens_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens").fetch_one(&pool).await.unwrap();

        let mut body = login_body("9876543210");
        body["otp"] = json!("0000");
        let response = server.post("/auth/v1/login").json(&body).await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        let tokens_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens").fetch_one(&pool).await.unwrap();
        assert_eq!(tokens_before, tokens_after);
        let last_login: Option<chrono::DateTime<chrono::Utc>> =
            sqlx::query_scalar("SELECT last_login FROM users WHERE mobile_number = '9876543210'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(last_login.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_may_grant_a_requested_role(pool: PgPool) {
        let server = test_server(pool);
        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;

        let mut body = login_body("9876543210");
        body["role"] = json!("Owner");
        let response = server.post("/auth/v1/login").json(&body).await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["data"]["role"], "Owner");
        let available: Vec<String> = body["data"]["availableRoles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(available.contains(&"Broker".to_string()));
        assert!(available.contains(&"Owner".to_string()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_rejects_unknown_role(pool: PgPool) {
        let server = test_server(pool);
        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;

        let mut body = login_body("9876543210");
        body["role"] = json!("Administrator");
        let response = server.post("/auth/v1/login").json(&body).await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_without_any_role_is_forbidden(pool: PgPool) {
        let server = test_server(pool.clone());
        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;

        // Strip every role assignment; the account survives but holds nothing
        sqlx::query("DELETE FROM user_roles").execute(&pool).await.unwrap();

        let response = server.post("/auth/v1/login").json(&login_body("9876543210")).await;
        response.assert_status(axum::http::StatusCode::FORBIDDEN);

        let body: Value = response.json();
        assert_eq!(body["message"], "No active role assigned to this account");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_mints_access_token_only(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let refresh_token = signup["data"]["refreshToken"].as_str().unwrap();

        let response = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {refresh_token}"))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["data"]["role"], "Broker");
        assert!(body["data"]["accessToken"].as_str().is_some());
        assert!(body["data"].get("refreshToken").is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_rejects_access_token(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let access_token = signup["data"]["accessToken"].as_str().unwrap();

        let response = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {access_token}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_for_deactivated_user_is_unauthorized(pool: PgPool) {
        let server = test_server(pool.clone());
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let refresh_token = signup["data"]["refreshToken"].as_str().unwrap().to_string();

        // Deactivate after issuance; the token row itself stays live
        sqlx::query("UPDATE users SET is_active = FALSE").execute(&pool).await.unwrap();

        let response = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {refresh_token}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        let body: Value = response.json();
        assert_eq!(body["message"], "Account is no longer active");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_without_credential_is_unauthorized(pool: PgPool) {
        let server = test_server(pool);
        let response = server.post("/auth/v1/refresh").await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_logout_revokes_and_is_not_repeatable(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let refresh_token = signup["data"]["refreshToken"].as_str().unwrap().to_string();

        let response = server
            .post("/auth/v1/logout")
            .add_header("authorization", format!("Bearer {refresh_token}"))
            .await;
        response.assert_status_ok();

        // A revoked token fails refresh...
        let response = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {refresh_token}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        // ...and a second logout is a conflict, not a silent success
        let response = server
            .post("/auth/v1/logout")
            .add_header("authorization", format!("Bearer {refresh_token}"))
            .await;
        response.assert_status(axum::http::StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_switch_role_requires_holding_the_target(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let access_token = signup["data"]["accessToken"].as_str().unwrap().to_string();

        // Broker only; Owner is not held and switch-role never grants
        let response = server
            .post("/auth/v1/switch-role")
            .add_header("authorization", format!("Bearer {access_token}"))
            .json(&json!({"role": "Owner"}))
            .await;
        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_switch_role_to_active_role_is_rejected(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let access_token = signup["data"]["accessToken"].as_str().unwrap().to_string();

        let response = server
            .post("/auth/v1/switch-role")
            .add_header("authorization", format!("Bearer {access_token}"))
            .json(&json!({"role": "Broker"}))
            .await;
        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_switch_role_rebinds_the_session(pool: PgPool) {
        let server = test_server(pool);
        server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await;

        // Grant Owner via login, then switch from Owner back to Broker
        let mut body = login_body("9876543210");
        body["role"] = json!("Owner");
        let login: Value = server.post("/auth/v1/login").json(&body).await.json();
        let access_token = login["data"]["accessToken"].as_str().unwrap().to_string();

        let response = server
            .post("/auth/v1/switch-role")
            .add_header("authorization", format!("Bearer {access_token}"))
            .json(&json!({"role": "Broker"}))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["data"]["previousRole"], "Owner");
        assert_eq!(body["data"]["role"], "Broker");

        // The new refresh token carries the new role claim on the next refresh
        let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
        let refreshed: Value = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {new_refresh}"))
            .await
            .json();
        assert_eq!(refreshed["data"]["role"], "Broker");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_switch_role_rotation_supersedes_the_old_refresh_token(pool: PgPool) {
        let server = test_server(pool);
        let signup: Value = server.post("/auth/v1/signup").json(&signup_body("9876543210", "a@x.com")).await.json();
        let old_refresh = signup["data"]["refreshToken"].as_str().unwrap().to_string();

        let mut body = login_body("9876543210");
        body["role"] = json!("Investor");
        let login: Value = server.post("/auth/v1/login").json(&body).await.json();
        let access_token = login["data"]["accessToken"].as_str().unwrap().to_string();

        server
            .post("/auth/v1/switch-role")
            .add_header("authorization", format!("Bearer {access_token}"))
            .json(&json!({"role": "Broker"}))
            .await
            .assert_status_ok();

        // Rotation reused the device row, so the signup-time token is dead
        let response = server
            .post("/auth/v1/refresh")
            .add_header("authorization", format!("Bearer {old_refresh}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_otp_validates_mobile_number(pool: PgPool) {
        let server = test_server(pool);

        let response = server.post("/auth/v1/otp").json(&json!({"mobileNumber": "12345"})).await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);

        let response = server.post("/auth/v1/otp").json(&json!({"mobileNumber": "9876543210"})).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["data"]["verificationId"].as_str().is_some());
    }
}
