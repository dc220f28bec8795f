#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use natours_api::auth::TokenIssuer;
use natours_api::database::models::Document;
use natours_api::database::RecordStore;
use natours_api::services::RecordingMailer;
use natours_api::{AppConfig, AppState};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "pass1234";

static TRACING: Once = Once::new();

/// One API instance on its own port with its own in-memory data.
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub mailer: RecordingMailer,
    pub client: Client,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.jwt_secret = TEST_SECRET.to_string();
    config.security.bcrypt_cost = 4;
    config
}

pub async fn spawn_server() -> Result<TestServer> {
    spawn_with_config(test_config()).await
}

pub async fn spawn_with_config(mut config: AppConfig) -> Result<TestServer> {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });

    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    config.server.port = port;
    let base_url = format!("http://127.0.0.1:{}", port);

    let mailer = RecordingMailer::new();
    let state = AppState::in_memory(config).with_mailer(Arc::new(mailer.clone()));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;
    tokio::spawn(natours_api::serve(listener, state.clone()));

    let server = TestServer { base_url, state, mailer, client: Client::new() };
    server.wait_ready(Duration::from_secs(5)).await?;
    Ok(server)
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if let Ok(res) = self.client.get(self.url("/health")).send().await {
                if res.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<Response> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Result<Response> {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    pub async fn patch(&self, path: &str, token: Option<&str>, body: Value) -> Result<Response> {
        let mut req = self.client.patch(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<Response> {
        let mut req = self.client.delete(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    /// Signs up a fresh account and returns its token and user document.
    pub async fn signup(&self, name: &str, email: &str) -> Result<(String, Value)> {
        let res = self
            .post(
                "/api/v1/users/signup",
                None,
                json!({
                    "name": name,
                    "email": email,
                    "password": PASSWORD,
                    "passwordConfirm": PASSWORD,
                }),
            )
            .await?;
        let status = res.status();
        let body: Value = res.json().await?;
        if status != StatusCode::CREATED {
            bail!("signup failed with {}: {}", status, body);
        }
        let token = body["token"].as_str().context("signup returned no token")?.to_string();
        Ok((token, body["data"]["user"].clone()))
    }

    /// Signs up an account and promotes it to `role` directly in the store.
    pub async fn user_with_role(&self, role: &str) -> Result<(String, Value)> {
        let email = format!("{}-{}@example.com", role, Uuid::new_v4().simple());
        let (token, mut user) = self.signup(&format!("Test {}", role), &email).await?;
        if role != "user" {
            let id = user_id(&user)?;
            let mut changes = Document::new();
            changes.insert("role".to_string(), json!(role));
            self.state
                .user_records
                .update_by_id(id, changes)
                .await?
                .context("promoted user vanished")?;
            user["role"] = json!(role);
        }
        Ok((token, user))
    }

    pub async fn create_tour(&self, token: &str, body: Value) -> Result<Value> {
        let res = self.post("/api/v1/tours", Some(token), body).await?;
        let status = res.status();
        let body: Value = res.json().await?;
        if status != StatusCode::CREATED {
            bail!("tour creation failed with {}: {}", status, body);
        }
        Ok(body["data"]["doc"].clone())
    }

    /// Session token for `user_id` issued at `issued_at`, signed with the test secret.
    pub fn token_issued_at(&self, user_id: Uuid, issued_at: chrono::DateTime<chrono::Utc>) -> Result<String> {
        let issuer = TokenIssuer::new(TEST_SECRET, self.state.config.security.jwt_expires_in);
        Ok(issuer.sign_with_issued_at(user_id, issued_at)?)
    }
}

pub fn user_id(user: &Value) -> Result<Uuid> {
    let id = user["id"].as_str().context("document has no id")?;
    Ok(Uuid::parse_str(id)?)
}

pub fn doc_id(doc: &Value) -> Result<String> {
    Ok(doc["id"].as_str().context("document has no id")?.to_string())
}

/// A valid tour body; `name` must be 10 to 40 characters.
pub fn tour_body(name: &str, price: f64, difficulty: &str) -> Value {
    json!({
        "name": name,
        "duration": 7,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "price": price,
        "summary": "Exploring the wilderness",
        "imageCover": "tour-cover.jpg",
        "startDates": ["2021-04-25T09:00:00.000Z", "2021-07-20T09:00:00.000Z", "2022-03-01"],
        "startLocation": {"type": "Point", "coordinates": [-116.214531, 51.417611], "address": "Banff, CAN"}
    })
}
