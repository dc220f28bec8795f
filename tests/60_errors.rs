mod common;

use anyhow::Result;
use natours_api::AppConfig;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

fn production_config() -> AppConfig {
    let mut config = AppConfig::production();
    config.security.jwt_secret = common::TEST_SECRET.to_string();
    config.security.bcrypt_cost = 4;
    config
}

#[tokio::test]
async fn unknown_route_names_the_path() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server.get("/api/v1/nowhere?x=1", None).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Can't find /api/v1/nowhere on this server!");
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_client_error() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server
        .client
        .post(server.url("/api/v1/users/login"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{\"email\": ")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "fail");
    Ok(())
}

#[tokio::test]
async fn oversized_bodies_are_refused() -> Result<()> {
    let server = common::spawn_server().await?;
    let padding = "x".repeat(20 * 1024);
    let res = server
        .post("/api/v1/users/login", None, json!({"email": "a@example.com", "password": padding}))
        .await?;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    Ok(())
}

#[tokio::test]
async fn development_errors_carry_details() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server.get("/api/v1/users/me", None).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["kind"], "UNAUTHORIZED");
    assert_eq!(body["error"]["statusCode"], 401);
    assert_eq!(body["error"]["isOperational"], true);
    Ok(())
}

#[tokio::test]
async fn production_errors_stay_terse() -> Result<()> {
    let server = common::spawn_with_config(production_config()).await?;
    let res = server.get("/api/v1/users/me", None).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "You are not logged in! Please log in to get access.");
    assert!(body.get("kind").is_none());
    assert!(body.get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn production_cookies_are_secure_only() -> Result<()> {
    let server = common::spawn_with_config(production_config()).await?;
    let res = server
        .post(
            "/api/v1/users/signup",
            None,
            json!({"name": "Prod User", "email": "prod@example.com", "password": "pass1234", "passwordConfirm": "pass1234"}),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.contains("Secure"), "unexpected cookie {}", cookie);
    Ok(())
}

#[tokio::test]
async fn invalid_ids_are_rejected_before_lookup() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server.get("/api/v1/tours/123abc", None).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Invalid id: 123abc");
    Ok(())
}
