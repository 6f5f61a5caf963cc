//! Google sign-in. Accounts are matched by provider subject first, then by email.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;
use url::Url;

use crate::{
    auth::oauth::{GOOGLE_PROVIDER, GoogleIdentity, GoogleOAuthClient},
    model::{
        CrudRepository, ResourceTyped,
        entity::{OAuthAccount, ProviderTokens, UserEntity, UserEntityCreateUpdate},
    },
    web::{
        AppState, AuthenticatedUser, WebError, WebResult,
        dto::auth::{AuthResponse, GoogleCallbackQuery, GoogleTokenRequest},
        error::ErrorResponse,
        routes::auth::{set_auth_cookie, start_session},
    },
};

/// Finds or creates the local user for a Google identity and signs them in.
async fn sign_in_with_google(
    state: &AppState,
    identity: GoogleIdentity,
    headers: &HeaderMap,
) -> WebResult<AuthResponse> {
    let mm = state.pool();
    let linked = OAuthAccount::find_user(mm, GOOGLE_PROVIDER, &identity.provider_account_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(OAuthAccount::get_resource_type(), e))?;

    let mut user = match linked {
        Some(user) => user,
        None => {
            let existing = UserEntity::find_by_email(mm, &identity.email)
                .await
                .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
            match existing {
                Some(user) => user,
                None => {
                    let created = UserEntity::create(
                        mm,
                        &AuthenticatedUser::admin(),
                        UserEntityCreateUpdate::oauth(&identity.email, &identity.full_name),
                    )
                    .await
                    .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
                    tracing::info!("created user {} from google sign-in", created.id());
                    created
                }
            }
        }
    };

    OAuthAccount::link(
        mm,
        user.id(),
        GOOGLE_PROVIDER,
        &identity.provider_account_id,
        ProviderTokens {
            access_token: &identity.tokens.access_token,
            refresh_token: identity.tokens.refresh_token.as_deref(),
            expires_at: identity.tokens.expires_at(),
        },
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(OAuthAccount::get_resource_type(), e))?;

    if !user.is_active() {
        return Err(WebError::account_inactive(user.account_status()));
    }

    user.record_login(mm)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    let tokens = start_session(state, &user, headers).await?;

    Ok(AuthResponse { tokens, user })
}

fn frontend_callback(state: &AppState, params: &[(&str, &str)]) -> WebResult<Redirect> {
    let base = format!("{}/auth/callback", state.config().host().frontend_url());
    let url = Url::parse_with_params(&base, params)
        .map_err(|e| WebError::service_unavailable(format!("invalid frontend url: {e}")))?;
    Ok(Redirect::to(url.as_str()))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google/login",
    description = "Redirects to the Google consent screen",
    responses(
        (status = 303, description = "Redirect to Google"),
        (status = 503, description = "Google OAuth is not configured", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn google_login_handler(State(state): State<AppState>) -> WebResult<Response> {
    let client = GoogleOAuthClient::from_config(state.config().oauth())?;
    let url = client.authorization_url()?;
    Ok(Redirect::to(url.as_str()).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google/callback",
    params(GoogleCallbackQuery),
    description = "Completes Google sign-in and redirects to the frontend with tokens in the query",
    responses(
        (status = 303, description = "Redirect to the frontend callback page"),
        (status = 503, description = "Google OAuth is not configured", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn google_callback_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(query): Query<GoogleCallbackQuery>,
) -> WebResult<Response> {
    let client = GoogleOAuthClient::from_config(state.config().oauth())?;

    if let Some(error) = query.error {
        tracing::warn!("google returned an error to the callback: {}", error);
        return Ok(frontend_callback(&state, &[("error", error.as_str())])?.into_response());
    }
    let Some(code) = query.code else {
        return Ok(frontend_callback(&state, &[("error", "missing_code")])?.into_response());
    };

    let signed_in = match client.authenticate(&code).await {
        Ok(identity) => sign_in_with_google(&state, identity, &headers).await,
        Err(e) => Err(e.into()),
    };

    match signed_in {
        Ok(auth) => {
            set_auth_cookie(&cookies, auth.tokens.access_token.clone());
            Ok(frontend_callback(
                &state,
                &[
                    ("access_token", auth.tokens.access_token.as_str()),
                    ("refresh_token", auth.tokens.refresh_token.as_str()),
                    ("token_type", auth.tokens.token_type.as_str()),
                ],
            )?
            .into_response())
        }
        Err(e) => {
            crate::error::log_error(&e);
            Ok(frontend_callback(&state, &[("error", "authentication_failed")])?.into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/google/token",
    request_body = GoogleTokenRequest,
    description = "Exchanges a Google authorization code for our token pair",
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Google rejected the code", body = ErrorResponse),
        (status = 403, description = "Account is not active", body = ErrorResponse),
        (status = 503, description = "Google OAuth is not configured", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn google_token_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(payload): Json<GoogleTokenRequest>,
) -> WebResult<impl IntoResponse> {
    let client = GoogleOAuthClient::from_config(state.config().oauth())?;
    let identity = client.authenticate(&payload.code).await?;
    let auth = sign_in_with_google(&state, identity, &headers).await?;
    set_auth_cookie(&cookies, auth.tokens.access_token.clone());

    Ok((StatusCode::OK, Json(auth)))
}
