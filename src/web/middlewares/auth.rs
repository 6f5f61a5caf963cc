use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    auth::{self, TokenType},
    model::{CrudRepository, ResourceTyped, entity::UserEntity},
    web::{AppState, RequestContext, context::AuthenticatedUser, error::WebError},
};

pub static AUTH_TOKEN: &str = "SID";

/// Resolves the caller from `Authorization: Bearer` or the `SID` cookie.
/// Requests without a token pass through anonymous.
pub async fn extract_context_fn(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| (String::from("bearer"), v.trim().to_string()));

    let token = bearer.or_else(|| {
        cookies
            .get(AUTH_TOKEN)
            .map(|c| (String::from(AUTH_TOKEN), c.value().to_string()))
    });

    let Some((source, token)) = token else {
        req.extensions_mut().insert(RequestContext::new(None));
        return Ok(next.run(req).await);
    };

    let claims = auth::process_token(
        &token,
        state.config().auth().jwt_secret(),
        TokenType::Access,
    )
    .map_err(|e| WebError::auth_token_invalid(&source, e))?;
    let id = claims
        .user_id()
        .map_err(|e| WebError::auth_token_invalid(&source, e))?;

    let user = UserEntity::find_by_id(state.pool(), &AuthenticatedUser::admin(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(WebError::auth_invalid_credentials)?;

    if !user.is_active() {
        return Err(WebError::account_inactive(user.account_status()));
    }

    req.extensions_mut()
        .insert(RequestContext::new(Some(AuthenticatedUser::new(
            id,
            user.role(),
        ))));
    Ok(next.run(req).await)
}
