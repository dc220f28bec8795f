mod common;

use anyhow::Result;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server.get("/health", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "success");
    Ok(())
}

#[tokio::test]
async fn signup_issues_token_cookie_and_welcome_mail() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server
        .post(
            "/api/v1/users/signup",
            None,
            json!({
                "name": "Laura Wilson",
                "email": "Laura@Example.com",
                "password": "pass1234",
                "passwordConfirm": "pass1234",
                "role": "admin"
            }),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("jwt="), "unexpected cookie {}", cookie);
    assert!(cookie.contains("HttpOnly"));
    assert!(!cookie.contains("Secure"), "development cookies are not secure-only");

    let body: Value = res.json().await?;
    assert_eq!(body["status"], "success");
    assert!(body["token"].as_str().map(|t| !t.is_empty()).unwrap_or(false));
    let user = &body["data"]["user"];
    assert_eq!(user["email"], "laura@example.com");
    assert_eq!(user["role"], "user", "role is never taken from the body");
    assert!(user.get("password").is_none());

    let welcome = server.mailer.last_to("laura@example.com").expect("welcome mail");
    assert!(welcome.body.contains("/me"));
    Ok(())
}

#[tokio::test]
async fn signup_rejects_mismatched_confirmation() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server
        .post(
            "/api/v1/users/signup",
            None,
            json!({"name": "Ann", "email": "ann@example.com", "password": "pass1234", "passwordConfirm": "pass4321"}),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "fail");
    assert!(body["fieldErrors"]["passwordConfirm"].is_string());
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_rejected() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("First", "dup@example.com").await?;
    assert!(server.signup("Second", "dup@example.com").await.is_err());
    Ok(())
}

#[tokio::test]
async fn login_requires_both_fields() -> Result<()> {
    let server = common::spawn_server().await?;
    let res = server.post("/api/v1/users/login", None, json!({"email": "a@example.com"})).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Please provide email and password!");
    Ok(())
}

#[tokio::test]
async fn login_failures_share_one_message() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("Kim", "kim@example.com").await?;

    let wrong_password = server
        .post("/api/v1/users/login", None, json!({"email": "kim@example.com", "password": "nope12345"}))
        .await?;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password: Value = wrong_password.json().await?;

    let unknown = server
        .post("/api/v1/users/login", None, json!({"email": "nobody@example.com", "password": "pass1234"}))
        .await?;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown: Value = unknown.json().await?;

    assert_eq!(wrong_password["message"], "Incorrect email or password");
    assert_eq!(wrong_password["message"], unknown["message"]);
    Ok(())
}

#[tokio::test]
async fn login_token_opens_protected_routes() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("Max", "max@example.com").await?;

    let res = server
        .post("/api/v1/users/login", None, json!({"email": "MAX@example.com", "password": common::PASSWORD}))
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let token = body["token"].as_str().unwrap_or_default();

    let me = server.get("/api/v1/users/me", Some(token)).await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me: Value = me.json().await?;
    assert_eq!(me["data"]["user"]["email"], "max@example.com");
    Ok(())
}

#[tokio::test]
async fn protect_rejects_missing_and_forged_tokens() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.get("/api/v1/users/me", None).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "You are not logged in! Please log in to get access.");

    let res = server.get("/api/v1/users/me", Some("not.a.jwt")).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_of_deleted_principal_is_rejected() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.signup("Gone", "gone@example.com").await?;

    let res = server.delete("/api/v1/users/deleteMe", Some(&token)).await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = server.get("/api/v1/users/me", Some(&token)).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .post("/api/v1/users/login", None, json!({"email": "gone@example.com", "password": common::PASSWORD}))
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn cookie_session_and_logout() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.signup("Cookie Monster", "cookie@example.com").await?;

    let res = server
        .client
        .get(server.url("/api/v1/users/me"))
        .header(header::COOKIE, format!("jwt={}", token))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.get("/api/v1/users/logout", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("jwt=loggedout"), "unexpected cookie {}", cookie);

    let res = server
        .client
        .get(server.url("/api/v1/users/me"))
        .header(header::COOKIE, "jwt=loggedout")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_probe_is_optional() -> Result<()> {
    let server = common::spawn_server().await?;

    let anonymous: Value = server.get("/api/v1/users/session", None).await?.json().await?;
    assert_eq!(anonymous["status"], "success");
    assert!(anonymous["data"]["user"].is_null());

    let broken: Value = server.get("/api/v1/users/session", Some("garbage")).await?.json().await?;
    assert!(broken["data"]["user"].is_null());

    let (token, user) = server.signup("Probe", "probe@example.com").await?;
    let known: Value = server.get("/api/v1/users/session", Some(&token)).await?.json().await?;
    assert_eq!(known["data"]["user"]["id"], user["id"]);
    Ok(())
}
