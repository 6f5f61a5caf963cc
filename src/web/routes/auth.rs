use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tower_cookies::{Cookie, Cookies, cookie::SameSite};

use crate::{
    auth::{
        self, PasswordPolicy, TokenPair, TokenType, hash_password, lockout::LockoutPolicy,
        token::hash_token, verify_password,
    },
    model::{
        CrudRepository, ResourceTyped,
        entity::{RefreshToken, RefreshTokenCreate, UserEntity, UserEntityCreateUpdate},
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::auth::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
            SignupRequest,
        },
        error::ErrorResponse,
        middlewares::{self, AUTH_TOKEN},
        routes::oauth,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    let protected = Router::new()
        .route("/logout", post(auth_logout_handler))
        .route("/change-password", post(auth_change_password_handler))
        .route("/me", get(auth_me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ));

    Router::new()
        .route("/signup", post(auth_signup_handler))
        .route("/login", post(auth_login_handler))
        .route("/refresh", post(auth_refresh_handler))
        .route("/google/login", get(oauth::google_login_handler))
        .route("/google/callback", get(oauth::google_callback_handler))
        .route("/google/token", post(oauth::google_token_handler))
        .merge(protected)
        .with_state(state)
}

pub(super) fn set_auth_cookie(cookies: &Cookies, token: String) {
    let mut cookie = Cookie::new(AUTH_TOKEN, token);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookies.add(cookie);
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Issues a token pair and persists the hash of its refresh token.
pub(super) async fn start_session(
    state: &AppState,
    user: &UserEntity,
    headers: &HeaderMap,
) -> WebResult<TokenPair> {
    let issued = auth::issue_token_pair(user.id(), state.config().auth())
        .map_err(WebError::server_crypt_error)?;

    let ip = header_value(headers, "x-forwarded-for").and_then(|v| v.split(',').next());
    RefreshToken::store(
        state.pool(),
        RefreshTokenCreate {
            user_id: user.id(),
            token_hash: hash_token(&issued.pair.refresh_token),
            expires_at: issued.refresh_expires_at,
            ip_address: ip.map(str::trim),
            user_agent: header_value(headers, "user-agent"),
        },
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(RefreshToken::get_resource_type(), e))?;

    Ok(issued.pair)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    description = "Registers a new account with email and password",
    responses(
        (status = 201, description = "User created", body = UserEntity),
        (status = 400, description = "Invalid email, name or weak password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn auth_signup_handler(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> WebResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(WebError::registration_invalid("a valid email is required."));
    }
    if payload.full_name.trim().is_empty() {
        return Err(WebError::registration_invalid("full name must not be blank."));
    }
    PasswordPolicy::from_config(state.config().auth())
        .validate(&payload.password)
        .map_err(|e| WebError::registration_invalid(e.to_string()))?;

    let found = UserEntity::find_by_email(state.pool(), &email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    if found.is_some() {
        return Err(WebError::registration_conflict());
    }

    let hash = hash_password(&payload.password).map_err(WebError::server_crypt_error)?;
    let admin = AuthenticatedUser::admin();
    let created = UserEntity::create(
        state.pool(),
        &admin,
        UserEntityCreateUpdate::with_password(&email, &payload.full_name, hash),
    )
    .await
    .map_err(|e| {
        if e.is_conflict() {
            WebError::registration_conflict()
        } else {
            WebError::resource_fetch_error(UserEntity::get_resource_type(), e)
        }
    })?;

    tracing::info!("registered user {}", created.id());
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    description = "Signs in with email and password, returns a token pair and sets the SID cookie",
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Credentials invalid", body = ErrorResponse),
        (status = 403, description = "Account is not active", body = ErrorResponse),
        (status = 423, description = "Account locked after too many failed attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn auth_login_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> WebResult<impl IntoResponse> {
    let mut user = UserEntity::find_by_email(state.pool(), &payload.email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(WebError::auth_invalid_credentials)?;

    let now = Utc::now();
    let lockout = LockoutPolicy::from_config(state.config().auth());
    match user.locked_until() {
        Some(until) if lockout.is_locked(Some(until), now) => {
            return Err(WebError::account_locked(until));
        }
        _ => {}
    }

    // accounts created through Google have no password
    let Some(hash) = user.hash() else {
        return Err(WebError::auth_invalid_credentials());
    };
    let is_verified = verify_password(hash, &payload.password).map_err(WebError::server_crypt_error)?;

    if !is_verified {
        let attempt = user
            .record_failed_login(state.pool(), &lockout, now)
            .await
            .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
        if attempt.locked_until.is_some() {
            tracing::warn!("locking user {} after {} failed logins", user.id(), attempt.attempts);
        }
        return Err(WebError::auth_invalid_credentials());
    }

    if !user.is_active() {
        return Err(WebError::account_inactive(user.account_status()));
    }

    user.record_login(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let tokens = start_session(&state, &user, &headers).await?;
    set_auth_cookie(&cookies, tokens.access_token.clone());

    Ok((StatusCode::OK, Json(AuthResponse { tokens, user })))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    description = "Exchanges a refresh token for a new pair. Refresh tokens are single use",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub(crate) async fn auth_refresh_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> WebResult<impl IntoResponse> {
    let claims = auth::process_token(
        &payload.refresh_token,
        state.config().auth().jwt_refresh_secret(),
        TokenType::Refresh,
    )
    .map_err(|_| WebError::auth_refresh_rejected())?;
    let user_id = claims.user_id().map_err(|_| WebError::auth_refresh_rejected())?;

    let stored = RefreshToken::find_by_hash(state.pool(), &hash_token(&payload.refresh_token))
        .await
        .map_err(|e| WebError::resource_fetch_error(RefreshToken::get_resource_type(), e))?
        .filter(|t| t.user_id() == user_id && t.is_usable(Utc::now()))
        .ok_or_else(WebError::auth_refresh_rejected)?;

    let revoked = stored
        .revoke(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(RefreshToken::get_resource_type(), e))?;
    if !revoked {
        return Err(WebError::auth_refresh_rejected());
    }

    let user = UserEntity::find_by_id(state.pool(), &AuthenticatedUser::admin(), user_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(WebError::auth_refresh_rejected)?;
    if !user.is_active() {
        return Err(WebError::account_inactive(user.account_status()));
    }

    let tokens = start_session(&state, &user, &headers).await?;
    set_auth_cookie(&cookies, tokens.access_token.clone());

    Ok((StatusCode::OK, Json(tokens)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshRequest,
    description = "Revokes the given refresh token and clears the SID cookie",
    responses(
        (status = 200, description = "Signed out", body = MessageResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn auth_logout_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RefreshRequest>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    RefreshToken::revoke_for_user(state.pool(), user.user_id(), &hash_token(&payload.refresh_token))
        .await
        .map_err(|e| WebError::resource_fetch_error(RefreshToken::get_resource_type(), e))?;

    let mut cookie = Cookie::from(AUTH_TOKEN);
    cookie.set_path("/");
    cookies.remove(cookie);

    Ok((StatusCode::OK, Json(MessageResponse::new("Signed out"))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    description = "Changes the password and revokes every refresh token of the user",
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password wrong or new password too weak", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn auth_change_password_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mut found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    let Some(hash) = found.hash() else {
        return Err(WebError::user_bad_request(
            "This account signs in with Google and has no password",
        ));
    };
    if !verify_password(hash, &payload.current_password).map_err(WebError::server_crypt_error)? {
        return Err(WebError::user_bad_request("Current password is incorrect"));
    }

    PasswordPolicy::from_config(state.config().auth())
        .validate(&payload.new_password)
        .map_err(|e| WebError::user_bad_request(e.to_string()))?;

    let new_hash = hash_password(&payload.new_password).map_err(WebError::server_crypt_error)?;
    found
        .set_password_hash(state.pool(), new_hash)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let revoked = RefreshToken::revoke_all_for_user(state.pool(), found.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(RefreshToken::get_resource_type(), e))?;
    tracing::info!("user {} changed password, revoked {} sessions", found.id(), revoked);

    Ok((StatusCode::OK, Json(MessageResponse::new("Password changed"))))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserEntity),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn auth_me_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    Ok((StatusCode::OK, Json(found)))
}
