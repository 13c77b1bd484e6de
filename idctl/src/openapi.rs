//! OpenAPI documentation for the authentication API.
//!
//! Served as JSON at `/api-docs/openapi.json` and rendered by RapiDoc at
//! `/docs`.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api;

/// Bearer security scheme. Refresh and logout expect the refresh token here;
/// switch-role expects the access token.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token authentication:\n\n```\nAuthorization: Bearer <token>\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "idctl API",
        description = "OTP-backed authentication and session-token lifecycle"
    ),
    paths(
        api::handlers::auth::send_otp,
        api::handlers::auth::signup,
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::auth::logout,
        api::handlers::auth::switch_role,
    ),
    components(schemas(
        api::models::ApiEnvelope<api::models::auth::SendOtpData>,
        api::models::ApiEnvelope<api::models::auth::SignupData>,
        api::models::ApiEnvelope<api::models::auth::LoginData>,
        api::models::ApiEnvelope<api::models::auth::RefreshData>,
        api::models::ApiEnvelope<api::models::auth::SwitchRoleData>,
        api::models::auth::SendOtpRequest,
        api::models::auth::SendOtpData,
        api::models::auth::SignupRequest,
        api::models::auth::SignupData,
        api::models::auth::LoginRequest,
        api::models::auth::LoginData,
        api::models::auth::RefreshData,
        api::models::auth::SwitchRoleRequest,
        api::models::auth::SwitchRoleData,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login and session-token lifecycle")
    )
)]
pub struct ApiDoc;
