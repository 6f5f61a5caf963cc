mod common;
use std::future::IntoFuture;

use learnpath::model::entity::UserEntity;
use learnpath::web::middlewares::AUTH_TOKEN;
use reqwest::StatusCode;
use serde_json::json;
use tower_cookies::cookie::SameSite;

use crate::common::{
    Action, Flow, STUDENT_PASSWORD, setup_server, setup_test_db, signin_action,
    signin_admin_action, signup_action, student_flow,
};

#[tokio::test]
async fn route_signup_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            signup_action("Ada@Example.com", "Ada Lovelace", STUDENT_PASSWORD).assert_json(
                |body| {
                    assert_eq!(body["email"], "ada@example.com");
                    assert_eq!(body["role"], "user");
                    assert!(body.get("password_hash").is_none());
                },
            ),
        )
        // try to signup twice
        .step(
            signup_action("ada@example.com", "Ada Again", STUDENT_PASSWORD)
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            signup_action("weak@example.com", "Weak", "password")
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            signup_action("blank@example.com", "   ", STUDENT_PASSWORD)
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_login_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("login@example.com", "Login Test", STUDENT_PASSWORD))
        .step(
            signin_action("login@example.com", STUDENT_PASSWORD)
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_json(|body| {
                    assert_eq!(body["token_type"], "bearer");
                    assert!(body["access_token"].is_string());
                    assert!(body["refresh_token"].is_string());
                    assert_eq!(body["user"]["email"], "login@example.com");
                })
                .with_clear_cookies(true),
        )
        // wrong credentials
        .step(
            signin_action("login@example.com", "Wr0ng#Password")
                .with_save_cookies(false)
                .with_clear_cookies(true)
                .assert_body(|body| assert!(body.contains("Authentication error")))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        // non-existing account
        .step(
            signin_action("nobody@example.com", STUDENT_PASSWORD)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lockout_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let mut flow = Flow::new().step(signup_action(
        "locked@example.com",
        "Locked Out",
        STUDENT_PASSWORD,
    ));
    for _ in 0..5 {
        flow = flow.step(
            signin_action("locked@example.com", "Wr0ng#Password")
                .with_save_cookies(false)
                .with_expect(StatusCode::UNAUTHORIZED),
        );
    }

    flow
        // even the right password is refused while locked
        .step(
            signin_action("locked@example.com", STUDENT_PASSWORD)
                .with_save_cookies(false)
                .with_expect(StatusCode::LOCKED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lockout_concurrent_guesses_test() {
    let pool = setup_test_db().await;
    let server = setup_server(&pool).await;
    let email = "burst@example.com";

    server
        .post("/api/v1/auth/signup")
        .json(&json!({ "email": email, "full_name": "Burst", "password": STUDENT_PASSWORD }))
        .await
        .assert_status(StatusCode::CREATED);

    let guess = || {
        server
            .post("/api/v1/auth/login")
            .json(&json!({ "email": email, "password": "Wr0ng#Password" }))
            .into_future()
    };
    let responses = tokio::join!(
        guess(),
        guess(),
        guess(),
        guess(),
        guess(),
        guess(),
        guess(),
        guess()
    );
    for resp in [
        responses.0, responses.1, responses.2, responses.3, responses.4, responses.5,
        responses.6, responses.7,
    ] {
        let status = resp.status_code();
        assert!(
            status == StatusCode::UNAUTHORIZED || status == StatusCode::LOCKED,
            "unexpected status {status}"
        );
    }

    // every guess is counted, none overwrites another
    let user = UserEntity::find_by_email(&pool.model_manager(), email)
        .await
        .unwrap()
        .unwrap();
    assert!(user.failed_login_attempts() >= 5);
    assert!(user.locked_until().is_some());

    server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": STUDENT_PASSWORD }))
        .await
        .assert_status(StatusCode::LOCKED);
}

#[tokio::test]
async fn route_suspended_login_checks_password_first_test() {
    let pool = setup_test_db().await;
    let server = setup_server(&pool).await;
    let email = "suspended@example.com";

    server
        .post("/api/v1/auth/signup")
        .json(&json!({ "email": email, "full_name": "Suspended", "password": STUDENT_PASSWORD }))
        .await
        .assert_status(StatusCode::CREATED);
    sqlx::query("UPDATE users SET account_status = 'suspended' WHERE email = $1")
        .bind(email)
        .execute(pool.model_manager().executor())
        .await
        .unwrap();

    // a wrong password looks like any other bad credential and is counted
    server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": "Wr0ng#Password" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    let user = UserEntity::find_by_email(&pool.model_manager(), email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.failed_login_attempts(), 1);

    server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": STUDENT_PASSWORD }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn route_me_with_bearer_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("bearer@example.com", "Bearer", STUDENT_PASSWORD))
        .step(
            signin_action("bearer@example.com", STUDENT_PASSWORD)
                .with_save_cookies(false)
                .with_save_as("login"),
        )
        .step(
            Action::new("me_anonymous", "GET", "/api/v1/auth/me")
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(
            Action::new("me_bearer", "GET", "/api/v1/auth/me")
                .with_bearer(|ctx| ctx.str_at("login", "/access_token"))
                .assert_json(|body| assert_eq!(body["email"], "bearer@example.com")),
        )
        .step(
            Action::new("me_garbage", "GET", "/api/v1/auth/me")
                .with_bearer(|_| "not-a-jwt".to_string())
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        // a refresh token is not an access token
        .step(
            Action::new("me_refresh_token", "GET", "/api/v1/auth/me")
                .with_bearer(|ctx| ctx.str_at("login", "/refresh_token"))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_refresh_is_single_use_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("refresh@example.com", "Refresh", STUDENT_PASSWORD))
        .step(signin_action("refresh@example.com", STUDENT_PASSWORD).with_save_as("login"))
        .step(
            Action::new("refresh", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| json!({ "refresh_token": ctx.str_at("login", "/refresh_token") }))
                .with_save_as("rotated"),
        )
        // the old refresh token is revoked by the rotation
        .step(
            Action::new("refresh_again", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| json!({ "refresh_token": ctx.str_at("login", "/refresh_token") }))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(
            Action::new("refresh_rotated", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| json!({ "refresh_token": ctx.str_at("rotated", "/refresh_token") }))
                .with_save_as("rotated_twice"),
        )
        .step(
            Action::new("refresh_access_token", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| json!({ "refresh_token": ctx.str_at("login", "/access_token") }))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        // logout revokes the presented token
        .step(
            Action::new("logout", "POST", "/api/v1/auth/logout")
                .with_dyn_body(|ctx| {
                    json!({ "refresh_token": ctx.str_at("rotated_twice", "/refresh_token") })
                }),
        )
        .step(
            Action::new("refresh_after_logout", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| {
                    json!({ "refresh_token": ctx.str_at("rotated_twice", "/refresh_token") })
                })
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_change_password_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    student_flow("changer@example.com")
        .step(
            Action::new("wrong_current", "POST", "/api/v1/auth/change-password")
                .with_body(json!({
                    "current_password": "Wr0ng#Password",
                    "new_password": "N3w#Password",
                }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("weak_new", "POST", "/api/v1/auth/change-password")
                .with_body(json!({
                    "current_password": STUDENT_PASSWORD,
                    "new_password": "short",
                }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("change", "POST", "/api/v1/auth/change-password").with_body(json!({
                "current_password": STUDENT_PASSWORD,
                "new_password": "N3w#Password",
            })),
        )
        .step(
            signin_action("changer@example.com", STUDENT_PASSWORD)
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(signin_action("changer@example.com", "N3w#Password"))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_list_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    student_flow("lister@example.com")
        // try to request without admin perms
        .step(
            Action::new("user_list", "GET", "/api/v1/users")
                .with_param("limit", "5")
                .with_param("offset", "0")
                .with_expect(StatusCode::FORBIDDEN),
        )
        // acquire admin account
        .step(signin_admin_action())
        .step(
            Action::new("user_list", "GET", "/api/v1/users")
                .with_param("limit", "5")
                .with_param("offset", "0")
                .assert_json(|body| {
                    assert_eq!(body["total"], 2);
                    assert_eq!(body["items"].as_array().map(Vec::len), Some(2));
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_access_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            signup_action("first@example.com", "First", STUDENT_PASSWORD)
                .with_save_cookies(false)
                .with_save_as("first"),
        )
        .step(
            signup_action("second@example.com", "Second", STUDENT_PASSWORD)
                .with_save_cookies(false)
                .with_save_as("second"),
        )
        .step(signin_action("second@example.com", STUDENT_PASSWORD).with_clear_cookies(true))
        // someone else's account
        .step(
            Action::new("user_get_other", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/{}", ctx.str_at("first", "/id")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("users_me", "GET", "/api/v1/users/me")
                .assert_json(|body| assert_eq!(body["email"], "second@example.com")),
        )
        .step(
            Action::new("users_profile", "GET", "/api/v1/users/profile")
                .assert_json(|body| assert_eq!(body["full_name"], "Second")),
        )
        .step(
            Action::new("user_get_self", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/{}", ctx.str_at("second", "/id")))
                .assert_json(|body| assert_eq!(body["full_name"], "Second")),
        )
        .step(signin_admin_action())
        .step(
            Action::new("admin_deletes_user", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/{}", ctx.str_at("first", "/id"))),
        )
        // the row stays, only its status changes
        .step(
            Action::new("admin_gets_deleted_user", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/{}", ctx.str_at("first", "/id")))
                .assert_json(|body| {
                    assert_eq!(body["account_status"], "deleted");
                    assert_eq!(body["email"], "first@example.com");
                }),
        )
        .step(
            signin_action("first@example.com", STUDENT_PASSWORD)
                .with_clear_cookies(true)
                .with_expect(StatusCode::FORBIDDEN),
        )
        // self deletion ends the caller's own session
        .step(
            signin_action("second@example.com", STUDENT_PASSWORD)
                .with_clear_cookies(true)
                .with_save_as("second_login"),
        )
        .step(
            Action::new("user_deletes_self", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/{}", ctx.str_at("second", "/id"))),
        )
        .step(Action::new("me_after_delete", "GET", "/api/v1/auth/me").with_expect(StatusCode::FORBIDDEN))
        .step(
            Action::new("refresh_after_delete", "POST", "/api/v1/auth/refresh")
                .with_dyn_body(|ctx| {
                    json!({ "refresh_token": ctx.str_at("second_login", "/refresh_token") })
                })
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}
