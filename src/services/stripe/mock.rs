use super::{
    CheckoutSession, CreateCheckoutSessionRequest, StripeEvent, StripeService, StripeServiceError,
    SubscriptionSummary,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub created_sessions: Arc<Mutex<Vec<CheckoutSession>>>,
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub subscriptions: Arc<Mutex<Vec<SubscriptionSummary>>>,
    pub list_subscription_calls: Arc<Mutex<usize>>,
    pub checkout_calls: Arc<Mutex<usize>>,
    pub reject_webhooks: bool,
    pub fail_subscription_list: bool,
    pub fail_checkout: bool,
    pub checkout_failure_status: Option<u16>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, status: &str, price_id: &str) -> Self {
        let sub = SubscriptionSummary {
            id: make_id("sub_test"),
            status: status.into(),
            price_id: Some(price_id.into()),
            created: now_secs(),
            cancel_at_period_end: false,
        };
        self.subscriptions.lock().unwrap().push(sub);
        self
    }

    /// Simulate a tampered or unsigned payload.
    pub fn rejecting_webhooks(mut self) -> Self {
        self.reject_webhooks = true;
        self
    }

    /// Simulate the billing API being unreachable for subscription listing.
    pub fn failing_subscription_list(mut self) -> Self {
        self.fail_subscription_list = true;
        self
    }

    pub fn failing_checkout(mut self) -> Self {
        self.fail_checkout = true;
        self
    }

    /// Fail checkout with a specific upstream HTTP status, like Stripe's
    /// 400 for an unknown price.
    pub fn failing_checkout_with_status(mut self, status: u16) -> Self {
        self.fail_checkout = true;
        self.checkout_failure_status = Some(status);
        self
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}", prefix, ts)
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        *self.checkout_calls.lock().unwrap() += 1;
        self.last_create_requests.lock().unwrap().push(req);
        if self.fail_checkout {
            return Err(StripeServiceError::Api {
                status: self.checkout_failure_status,
                message: "No such price".to_string(),
            });
        }

        let session = CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        };
        self.created_sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if self.reject_webhooks {
            return Err(StripeServiceError::Webhook(
                "signature mismatch".to_string(),
            ));
        }
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(StripeEvent {
            id,
            r#type: ty,
            payload: val,
        })
    }

    async fn list_subscriptions_for_customer(
        &self,
        _customer_id: &str,
    ) -> Result<Vec<SubscriptionSummary>, StripeServiceError> {
        *self.list_subscription_calls.lock().unwrap() += 1;
        if self.fail_subscription_list {
            return Err(StripeServiceError::Api {
                status: None,
                message: "connection refused".to_string(),
            });
        }
        Ok(self.subscriptions.lock().unwrap().clone())
    }
}
