use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("invalid checkout amount: {0}")]
    InvalidAmount(f64),

    #[error("checkout provider failed: {0}")]
    Provider(String),
}

/// What the payment provider needs to open a hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub tour_id: Uuid,
    pub tour_name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub amount_cents: i64,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Converts a price in whole currency units to cents, refusing values a
    /// provider could not charge.
    pub fn amount_from_price(price: f64) -> Result<i64, CheckoutError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(CheckoutError::InvalidAmount(price));
        }
        Ok((price * 100.0).round() as i64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    #[serde(rename = "amountTotal")]
    pub amount_total: i64,
    #[serde(rename = "customerEmail")]
    pub customer_email: String,
    #[serde(rename = "clientReferenceId")]
    pub client_reference_id: Uuid,
}

/// Payment-provider collaborator: creates hosted checkout sessions.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError>;
}

/// Provider that fabricates sessions locally, for development and tests.
#[derive(Debug, Clone)]
pub struct LocalCheckout {
    base_url: String,
}

impl LocalCheckout {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

#[async_trait]
impl CheckoutProvider for LocalCheckout {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let id = format!("cs_local_{}", Uuid::new_v4().simple());
        tracing::info!(
            "Created local checkout session {} for tour {} ({} cents)",
            id,
            request.tour_id,
            request.amount_cents
        );
        Ok(CheckoutSession {
            url: format!("{}/checkout/{}", self.base_url.trim_end_matches('/'), id),
            id,
            amount_total: request.amount_cents,
            customer_email: request.customer_email,
            client_reference_id: request.tour_id,
        })
    }
}
