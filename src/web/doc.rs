use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::web::middlewares::AUTH_TOKEN;

pub struct AuthSchemesModifier;

impl Modify for AuthSchemesModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(schema) = openapi.components.as_mut() {
            schema.add_security_scheme(
                "cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    AUTH_TOKEN,
                    "Access token for current user",
                ))),
            );
            schema.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::routes::auth::auth_signup_handler,
        crate::web::routes::auth::auth_login_handler,
        crate::web::routes::auth::auth_refresh_handler,
        crate::web::routes::auth::auth_logout_handler,
        crate::web::routes::auth::auth_change_password_handler,
        crate::web::routes::auth::auth_me_handler,
        crate::web::routes::oauth::google_login_handler,
        crate::web::routes::oauth::google_callback_handler,
        crate::web::routes::oauth::google_token_handler,
        crate::web::routes::progress::progress_pathways_handler,
        crate::web::routes::progress::progress_pathway_detail_handler,
        crate::web::routes::progress::progress_summary_handler,
        crate::web::routes::progress::progress_dashboard_handler,
        crate::web::routes::progress::progress_start_pathway_handler,
        crate::web::routes::progress::progress_update_handler,
        crate::web::routes::progress::progress_complete_module_handler,
        crate::web::routes::progress::progress_completions_handler,
        crate::web::routes::progress::progress_achievements_handler,
        crate::web::routes::progress::progress_user_achievements_handler,
        crate::web::routes::progress::progress_streak_handler,
        crate::web::routes::resources::pathway_resources_handler,
        crate::web::routes::resources::module_resources_handler,
        crate::web::routes::resources::module_resources_with_progress_handler,
        crate::web::routes::resources::resource_progress_handler,
        crate::web::routes::resources::resource_progress_update_handler,
        crate::web::routes::resources::resource_start_handler,
        crate::web::routes::resources::resource_complete_handler,
        crate::web::routes::resources::resource_upload_handler,
        crate::web::routes::resources::resource_submissions_handler,
        crate::web::routes::resources::submission_download_handler,
        crate::web::routes::resources::submission_delete_handler,
        crate::web::routes::review::pending_submissions_handler,
        crate::web::routes::review::review_submission_handler,
        crate::web::routes::review::pending_module_completions_handler,
        crate::web::routes::review::review_module_completion_handler,
        crate::web::routes::files::signed_file_handler,
        crate::web::routes::users::user_list_handler,
        crate::web::routes::users::user_get_handler,
        crate::web::routes::users::user_delete_handler,
        crate::web::routes::admin::dashboard_handler,
        crate::web::routes::admin::dashboard_review_handler,
        crate::web::routes::admin::dashboard_download_handler,
        crate::web::routes::health::health_handler,
    ),
    modifiers(&AuthSchemesModifier),
    tags(
        (name = "auth", description = "Accounts, sessions and Google sign-in"),
        (name = "progress", description = "Pathway progress, streaks and achievements"),
        (name = "resources", description = "Resources, progress and submissions"),
        (name = "review", description = "Staff review of submissions and modules"),
    )
)]
pub struct ApiDoc;
