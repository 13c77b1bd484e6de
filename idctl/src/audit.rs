//! Redacted audit trail for authentication use cases.
//!
//! Every use case, success or failure, emits exactly one record. The write is
//! fire-and-forget: it runs on a detached task and its failure is logged at
//! warn, never propagated to the request that produced it.
//!
//! Redaction happens before the record leaves the handler: OTP codes and
//! tokens are always replaced with a placeholder, and on success the
//! identifying fields (mobile number, email) are replaced with a success
//! marker. Failure records keep the identifiers so support staff can find the
//! attempt the user is calling about.

use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::types::UserId;

/// Placeholder written over secret-bearing fields
const REDACTED: &str = "[REDACTED]";

/// Marker written over identifying fields on success records
const SUCCESS_MARKER: &str = "[OK]";

/// One audit record, already redacted
#[derive(Debug)]
pub struct AuditRecord {
    pub user_id: Option<UserId>,
    pub endpoint: &'static str,
    pub request_body: Value,
    pub status_code: u16,
    pub response_body: Value,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub detail: Option<String>,
}

#[derive(Clone)]
pub struct AuditSink {
    db: PgPool,
}

impl AuditSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Queue a record for insertion. Returns immediately.
    pub fn record(&self, record: AuditRecord) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = write(&db, &record).await {
                warn!("Failed to write audit record for {}: {e}", record.endpoint);
            }
        });
    }
}

async fn write(db: &PgPool, record: &AuditRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, endpoint, request_body, status_code, response_body, duration_ms, error, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.user_id)
    .bind(record.endpoint)
    .bind(&record.request_body)
    .bind(record.status_code as i32)
    .bind(&record.response_body)
    .bind(record.duration_ms)
    .bind(&record.error)
    .bind(&record.detail)
    .execute(db)
    .await?;

    Ok(())
}

fn is_secret_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "otp" || key.contains("token")
}

fn is_identifying_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "mobilenumber" || key == "email"
}

/// Produce the storable version of a request body.
///
/// Walks nested objects and arrays; scalar leaves under a secret key are
/// overwritten unconditionally, identifying leaves only when the request
/// succeeded.
pub fn redact_request(body: &Value, success: bool) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let redacted = if is_secret_field(key) {
                        Value::String(REDACTED.to_string())
                    } else if success && is_identifying_field(key) {
                        Value::String(SUCCESS_MARKER.to_string())
                    } else {
                        redact_request(value, success)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| redact_request(item, success)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_secrets_are_always_redacted() {
        let body = json!({
            "mobileNumber": "9876543210",
            "otp": "4321",
            "verificationId": "v-1",
            "refreshToken": "eyJ..."
        });

        for success in [true, false] {
            let redacted = redact_request(&body, success);
            assert_eq!(redacted["otp"], REDACTED);
            assert_eq!(redacted["refreshToken"], REDACTED);
            // Verification ids are opaque handles, not secrets
            assert_eq!(redacted["verificationId"], "v-1");
        }
    }

    #[test]
    fn test_identifiers_survive_only_on_failure() {
        let body = json!({"mobileNumber": "9876543210", "email": "a@x.com"});

        let on_success = redact_request(&body, true);
        assert_eq!(on_success["mobileNumber"], SUCCESS_MARKER);
        assert_eq!(on_success["email"], SUCCESS_MARKER);

        let on_failure = redact_request(&body, false);
        assert_eq!(on_failure["mobileNumber"], "9876543210");
        assert_eq!(on_failure["email"], "a@x.com");
    }

    #[test]
    fn test_nested_bodies_are_walked() {
        let body = json!({"session": {"accessToken": "a.b.c"}, "attempts": [{"otp": "1111"}]});
        let redacted = redact_request(&body, false);

        assert_eq!(redacted["session"]["accessToken"], REDACTED);
        assert_eq!(redacted["attempts"][0]["otp"], REDACTED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_write_persists_a_record(pool: sqlx::PgPool) {
        let record = AuditRecord {
            user_id: None,
            endpoint: "/auth/v1/login",
            request_body: json!({"mobileNumber": "9876543210"}),
            status_code: 404,
            response_body: json!({"success": false}),
            duration_ms: 12,
            error: Some("Account does not exist, please sign up first".to_string()),
            detail: Some("no active user for mobile".to_string()),
        };

        write(&pool, &record).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE endpoint = '/auth/v1/login'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
