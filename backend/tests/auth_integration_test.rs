//! Integration tests for authentication endpoints

mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::{json, Value};

async fn signup(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let body = json!({ "email": email, "password": password });
    let (status, response) = app.post("/api/v1/auth/signup", &body.to_string()).await;
    (status, serde_json::from_str(&response).unwrap_or(Value::Null))
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let body = json!({ "email": email, "password": password });
    let (status, response) = app.post("/api/v1/auth/login", &body.to_string()).await;
    (status, serde_json::from_str(&response).unwrap_or(Value::Null))
}

async fn refresh(app: &TestApp, refresh_token: &str) -> (StatusCode, Value) {
    let body = json!({ "refresh_token": refresh_token });
    let (status, response) = app.post("/api/v1/auth/refresh", &body.to_string()).await;
    (status, serde_json::from_str(&response).unwrap_or(Value::Null))
}

fn token(value: &Value, field: &str) -> String {
    value[field].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_signup_success() {
    let app = TestApp::new();

    let (status, response) = signup(&app, "Signup@Example.com", "SecurePassword123!").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["email"], "signup@example.com");
    assert_eq!(response["role"], "user");
    assert!(response.get("password_hash").is_none());
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let app = TestApp::new();

    let (status, _) = signup(&app, "duplicate@example.com", "SecurePassword123!").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = signup(&app, "duplicate@example.com", "SecurePassword123!").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signup_invalid_input() {
    let app = TestApp::new();

    let (status, _) = signup(&app, "not-an-email", "SecurePassword123!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = signup(&app, "weak_password@example.com", "123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_returns_token_pair() {
    let app = TestApp::new();
    signup(&app, "a@x.com", "longenough1").await;

    let (status, response) = login(&app, "a@x.com", "longenough1").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!token(&response, "access_token").is_empty());
    assert!(!token(&response, "refresh_token").is_empty());
    assert_eq!(response["token_type"], "Bearer");
    assert_eq!(response["expires_in"], 604_800);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new();
    signup(&app, "a@x.com", "longenough1").await;

    let (status, response) = login(&app, "a@x.com", "WrongPassword!").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["message"], "invalid credentials");
}

#[tokio::test]
async fn test_login_nonexistent_user() {
    let app = TestApp::new();

    let (status, response) = login(&app, "nonexistent@example.com", "SomePassword123!").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["message"], "invalid credentials");
}

#[tokio::test]
async fn test_two_logins_are_independent_sessions() {
    let app = TestApp::new();
    signup(&app, "a@x.com", "longenough1").await;

    let (_, first) = login(&app, "a@x.com", "longenough1").await;
    let (_, second) = login(&app, "a@x.com", "longenough1").await;
    assert_ne!(first["access_token"], second["access_token"]);

    let (status, _) = app
        .post_authed("/api/v1/auth/logout", &token(&first, "access_token"))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .get_authed("/api/v1/users/me", &token(&second, "access_token"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::new();
    signup(&app, "a@x.com", "longenough1").await;
    let (_, pair) = login(&app, "a@x.com", "longenough1").await;
    let old_refresh = token(&pair, "refresh_token");

    let (status, rotated) = refresh(&app, &old_refresh).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(token(&rotated, "refresh_token"), old_refresh);

    let (status, response) = refresh(&app, &old_refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["message"], "invalid or expired refresh token");

    let (status, _) = refresh(&app, &token(&rotated, "refresh_token")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_yields_one_pair() {
    let app = TestApp::new();
    signup(&app, "a@x.com", "longenough1").await;
    let (_, pair) = login(&app, "a@x.com", "longenough1").await;
    let refresh_token = token(&pair, "refresh_token");

    let (a, b) = tokio::join!(refresh(&app, &refresh_token), refresh(&app, &refresh_token));

    let mut statuses = [a.0.as_u16(), b.0.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 401]);
}

#[tokio::test]
async fn test_logout_requires_token() {
    let app = TestApp::new();

    let (status, _) = app.post("/api/v1/auth/logout", "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_full_flow_postgres() {
    let app = TestApp::with_postgres().await;

    let (status, _) = signup(&app, "pg@example.com", "longenough1").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, pair) = login(&app, "pg@example.com", "longenough1").await;
    assert_eq!(status, StatusCode::OK);
    let access = token(&pair, "access_token");

    let (status, me) = app.get_authed("/api/v1/users/me", &access).await;
    assert_eq!(status, StatusCode::OK);
    assert!(me.contains("pg@example.com"));

    let (status, rotated) = refresh(&app, &token(&pair, "refresh_token")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get_authed("/api/v1/users/me", &access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let new_access = token(&rotated, "access_token");
    let (status, _) = app.post_authed("/api/v1/auth/logout", &new_access).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get_authed("/api/v1/users/me", &new_access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
