use crate::{
    Config,
    web::{AppState, doc::ApiDoc},
};
use axum::Router;
use serde::Deserialize;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod admin;
pub mod auth;
pub mod files;
pub mod health;
pub mod oauth;
pub mod progress;
pub mod resources;
pub mod review;
pub mod users;

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct PaginationQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PaginationQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

pub fn build_app<S: Send + Sync + Clone + 'static>(
    state: AppState,
    config: &'static Config,
) -> Router<S> {
    let mut router = Router::new()
        .nest("/api/v1/auth", auth::routes(state.clone()))
        .nest("/api/v1/progress", progress::routes(state.clone()))
        .nest("/api/v1/admin", review::routes(state.clone()))
        .nest("/api/v1/files", files::routes(state.clone()))
        .nest("/api/v1/users", users::routes(state.clone()))
        .nest("/api/v1", resources::routes(state.clone()))
        .nest("/admin", admin::routes(state.clone()))
        .nest("/health", health::routes(state.clone()))
        .layer(CookieManagerLayer::default())
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    if config.app().docs() {
        let openapi = ApiDoc::openapi();

        router = router.merge(SwaggerUi::new("/api/v1/docs").url("/api-doc/openapi.json", openapi));
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let query = PaginationQuery {
            limit: None,
            offset: Some(-5),
        };
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);

        let query = PaginationQuery {
            limit: Some(10_000),
            offset: Some(40),
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(query.offset(), 40);
    }
}
