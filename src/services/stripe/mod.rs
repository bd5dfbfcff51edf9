// NOTE: async-stripe is compiled with a minimal feature set (runtime-tokio-hyper, checkout,
// webhook-events, and connect to satisfy webhook payload types). Touching APIs outside those
// features requires updating Cargo.toml explicitly so we keep compile times in check.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe api error: {message}")]
    Api {
        /// Upstream HTTP status, when the provider returned one.
        status: Option<u16>,
        message: String,
    },
    #[error("webhook verification failed: {0}")]
    Webhook(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("other error: {0}")]
    Other(String),
}

impl StripeServiceError {
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            StripeServiceError::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        let status = match &err {
            stripe::StripeError::Stripe(req) => Some(req.http_status),
            _ => None,
        };
        StripeServiceError::Api {
            status,
            message: err.to_string(),
        }
    }
}

impl From<stripe::WebhookError> for StripeServiceError {
    fn from(err: stripe::WebhookError) -> Self {
        StripeServiceError::Webhook(err.to_string())
    }
}

/// The webhook event kinds this service acts on. Everything Stripe can send
/// that we do not care about lands on `Unrecognized` and is acknowledged
/// without processing, so Stripe's retry policy is never triggered by noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillingEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    CheckoutSessionCompleted,
    Unrecognized,
}

impl BillingEventKind {
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => BillingEventKind::SubscriptionCreated,
            "customer.subscription.updated" => BillingEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => BillingEventKind::SubscriptionDeleted,
            "checkout.session.completed" => BillingEventKind::CheckoutSessionCompleted,
            _ => BillingEventKind::Unrecognized,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    pub r#type: String,
    pub payload: serde_json::Value,
}

impl StripeEvent {
    pub fn kind(&self) -> BillingEventKind {
        BillingEventKind::from_event_type(&self.r#type)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub price_id: String,
    pub quantity: u64,
    pub client_reference_id: Option<String>,
    pub customer: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// The slice of a Stripe subscription the resolver needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub id: String,
    /// Stripe's fine-grained status string, not yet collapsed.
    pub status: String,
    pub price_id: Option<String>,
    /// Unix timestamp (seconds) when the subscription was created
    pub created: i64,
    pub cancel_at_period_end: bool,
}

#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError>;

    /// All subscriptions for a customer in Stripe's default ordering. The
    /// caller decides what to do when there is more than one.
    async fn list_subscriptions_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<SubscriptionSummary>, StripeServiceError>;
}

mod live;
mod mock;

#[allow(unused_imports)]
pub use live::LiveStripeService;
#[allow(unused_imports)]
pub use mock::MockStripeService;
