use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Success envelope: `{ "status": "success", ...fields }`.
#[derive(Debug)]
pub struct ApiResponse {
    body: Map<String, Value>,
    status_code: StatusCode,
}

impl ApiResponse {
    pub fn success() -> Self {
        let mut body = Map::new();
        body.insert("status".to_string(), json!("success"));
        Self { body, status_code: StatusCode::OK }
    }

    /// `{ status, data: { <key>: value } }`
    pub fn data(key: &str, value: impl Serialize) -> Self {
        Self::success().with_data(key, value)
    }

    /// `{ status, results, data: { <key>: [..] } }`
    pub fn list<T: Serialize>(key: &str, items: Vec<T>) -> Self {
        let results = items.len();
        Self::success().with("results", results).with_data(key, items)
    }

    pub fn created(key: &str, value: impl Serialize) -> Self {
        Self::data(key, value).with_status(StatusCode::CREATED)
    }

    pub fn no_content() -> Self {
        Self::success().with_status(StatusCode::NO_CONTENT)
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.body.insert(key.to_string(), to_value(value));
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Serialize) -> Self {
        let data = self
            .body
            .entry("data".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(data) = data {
            data.insert(key.to_string(), to_value(value));
        }
        self
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize response data: {}", e);
        Value::Null
    })
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        if self.status_code == StatusCode::NO_CONTENT {
            return self.status_code.into_response();
        }
        (self.status_code, Json(Value::Object(self.body))).into_response()
    }
}

pub type ApiResult = Result<ApiResponse, crate::error::ApiError>;
