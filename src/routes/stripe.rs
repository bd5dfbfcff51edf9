use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use tracing::{error, info, warn};

use crate::models::subscription::SubscriptionStatus;
use crate::responses::JsonResponse;
use crate::services::stripe::BillingEventKind;
use crate::state::AppState;

// Small helper: nested json lookup
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_customer_id(event: &serde_json::Value) -> Option<String> {
    extract_str(event, &["data", "object", "customer"]).map(|s| s.to_string())
}

fn extract_checkout_user_id(event: &serde_json::Value) -> Option<String> {
    // checkout.session payload shape; prefer explicit metadata.user_id,
    // fall back to client_reference_id (we set it to the user id string).
    let obj = jget(event, &["data", "object"])?;
    if let Some(uid) = obj
        .get("metadata")
        .and_then(|m| m.get("user_id"))
        .and_then(|v| v.as_str())
    {
        return Some(uid.to_string());
    }
    obj.get("client_reference_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_plan_id(event: &serde_json::Value) -> Option<String> {
    // Subscription payloads carry the price under items.data[0].price.id;
    // older API shapes expose it as plan.id.
    if let Some(price) = jget(event, &["data", "object", "items", "data"])
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("price"))
        .and_then(|price| price.get("id"))
        .and_then(|v| v.as_str())
    {
        return Some(price.to_string());
    }
    extract_str(event, &["data", "object", "plan", "id"]).map(|s| s.to_string())
}

fn acknowledge() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    // Verification happens over the exact bytes Stripe sent; nothing in the
    // payload is trusted before this point.
    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    let evt_type = evt.r#type.as_str();
    let payload = &evt.payload;

    match evt.kind() {
        BillingEventKind::SubscriptionCreated | BillingEventKind::SubscriptionUpdated => {
            let customer_id = match extract_customer_id(payload) {
                Some(id) => id,
                None => {
                    warn!(evt_type, "subscription event missing customer reference");
                    return acknowledge();
                }
            };

            let provider_status =
                extract_str(payload, &["data", "object", "status"]).unwrap_or("unknown");
            let status = SubscriptionStatus::from_provider(provider_status);
            let plan_id = extract_plan_id(payload);

            match app_state
                .subscriptions
                .update_status_and_plan_by_customer(&customer_id, status, plan_id.as_deref())
                .await
            {
                Ok(true) => {
                    info!(customer_id, provider_status, %status, "applied subscription change");
                    acknowledge()
                }
                Ok(false) => {
                    // Inconsistency: Stripe knows a customer we never linked.
                    // Drop the event; a retry would hit the same miss.
                    warn!(
                        customer_id,
                        evt_type, "subscription event for unknown customer dropped"
                    );
                    acknowledge()
                }
                Err(err) => {
                    // Non-2xx so Stripe redelivers; the event must not be
                    // lost to a transient database failure.
                    error!(?err, customer_id, "failed to persist subscription change");
                    JsonResponse::server_error("subscription update not persisted").into_response()
                }
            }
        }

        BillingEventKind::SubscriptionDeleted => {
            let customer_id = match extract_customer_id(payload) {
                Some(id) => id,
                None => {
                    warn!(evt_type, "subscription deletion missing customer reference");
                    return acknowledge();
                }
            };

            match app_state
                .subscriptions
                .clear_subscription_by_customer(&customer_id)
                .await
            {
                Ok(true) => {
                    info!(customer_id, "subscription deleted; record reset to free");
                    acknowledge()
                }
                Ok(false) => {
                    warn!(
                        customer_id,
                        "subscription deletion for unknown customer dropped"
                    );
                    acknowledge()
                }
                Err(err) => {
                    error!(?err, customer_id, "failed to reset record on deletion");
                    JsonResponse::server_error("subscription reset not persisted").into_response()
                }
            }
        }

        BillingEventKind::CheckoutSessionCompleted => {
            // Link the freshly-created Stripe customer to the user that
            // started checkout. Status/plan arrive separately via
            // customer.subscription.created.
            let user_id = extract_checkout_user_id(payload);
            let customer_id = extract_customer_id(payload);

            let (Some(user_id), Some(customer_id)) = (user_id, customer_id) else {
                warn!(evt_type, "checkout completion without user or customer reference");
                return acknowledge();
            };

            match app_state
                .subscriptions
                .set_stripe_customer_id(&user_id, &customer_id)
                .await
            {
                Ok(true) => {
                    info!(user_id, customer_id, "linked stripe customer after checkout");
                    acknowledge()
                }
                Ok(false) => {
                    // Inconsistency: checkout ran for a user we have no
                    // record of. Log it; a retry would hit the same miss.
                    warn!(
                        user_id,
                        customer_id, "checkout completion for unknown user dropped"
                    );
                    acknowledge()
                }
                Err(err) => {
                    error!(?err, user_id, customer_id, "failed to link stripe customer");
                    JsonResponse::server_error("customer link not persisted").into_response()
                }
            }
        }

        BillingEventKind::Unrecognized => {
            info!(evt_type, "unhandled stripe event acknowledged");
            acknowledge()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::MockDb;
    use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};
    use crate::services::stripe::MockStripeService;
    use crate::state::test_support::test_state;
    use axum::extract::State as AxumState;
    use axum::http::{HeaderMap, HeaderValue};
    use std::sync::Arc;

    fn active_record(user_id: &str, customer_id: &str) -> SubscriptionRecord {
        let mut record = SubscriptionRecord::new(user_id);
        record.stripe_customer_id = Some(customer_id.to_string());
        record.subscription_status = SubscriptionStatus::Active;
        record.plan_id = Some("price_premium_monthly".to_string());
        record
    }

    fn signed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static("t=1,v1=stub"));
        headers
    }

    fn subscription_event(evt_type: &str, customer_id: &str, status: &str) -> axum::body::Bytes {
        let body = serde_json::json!({
            "id": "evt_123",
            "type": evt_type,
            "data": { "object": {
                "id": "sub_123",
                "customer": customer_id,
                "status": status,
                "items": { "data": [ { "price": { "id": "price_premium_monthly" } } ] }
            } }
        });
        axum::body::Bytes::from(serde_json::to_vec(&body).unwrap())
    }

    #[tokio::test]
    async fn webhook_missing_signature_rejected_without_mutation() {
        let db = Arc::new(MockDb::with_record(active_record("auth0|u1", "cus_1")));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let resp = webhook(
            AxumState(state),
            HeaderMap::new(),
            subscription_event("customer.subscription.updated", "cus_1", "past_due"),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*db.update_status_and_plan_calls.lock().unwrap(), 0);
        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn webhook_invalid_signature_rejected_without_mutation() {
        let db = Arc::new(MockDb::with_record(active_record("auth0|u1", "cus_1")));
        let stripe = Arc::new(MockStripeService::new().rejecting_webhooks());
        let state = test_state(db.clone(), stripe);

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            subscription_event("customer.subscription.updated", "cus_1", "past_due"),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*db.update_status_and_plan_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn webhook_subscription_updated_applies_collapsed_status() {
        let db = Arc::new(MockDb::with_record(active_record("auth0|u1", "cus_1")));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let resp = webhook(
            AxumState(state.clone()),
            signed_headers(),
            subscription_event("customer.subscription.updated", "cus_1", "past_due"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(record.plan_id.as_deref(), Some("price_premium_monthly"));

        // Replaying the identical event converges to the same state.
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            subscription_event("customer.subscription.updated", "cus_1", "past_due"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn webhook_trialing_collapses_to_active() {
        let mut seeded = active_record("auth0|u1", "cus_1");
        seeded.subscription_status = SubscriptionStatus::Free;
        let db = Arc::new(MockDb::with_record(seeded));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            subscription_event("customer.subscription.created", "cus_1", "trialing"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn webhook_unknown_customer_dropped_but_acknowledged() {
        let db = Arc::new(MockDb::with_record(active_record("auth0|u1", "cus_1")));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            subscription_event("customer.subscription.updated", "cus_other", "past_due"),
        )
        .await;

        // Acknowledged so Stripe does not retry an event we can never match.
        assert_eq!(resp.status(), StatusCode::OK);
        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn webhook_subscription_deleted_resets_to_free_and_clears_plan() {
        let db = Arc::new(MockDb::with_record(active_record("auth0|u1", "cus_1")));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let body = serde_json::json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123", "customer": "cus_1", "status": "canceled" } }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Free);
        assert!(record.plan_id.is_none());
    }

    #[tokio::test]
    async fn webhook_persistence_failure_returns_retryable_error() {
        let db = Arc::new(MockDb {
            should_fail: true,
            ..Default::default()
        });
        let state = test_state(db, Arc::new(MockStripeService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            subscription_event("customer.subscription.updated", "cus_1", "active"),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn webhook_checkout_completion_links_customer() {
        let db = Arc::new(MockDb::with_record(SubscriptionRecord::new("auth0|u1")));
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let body = serde_json::json!({
            "id": "evt_cs",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_123",
                "client_reference_id": "auth0|u1",
                "customer": "cus_new"
            } }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_new"));
    }

    #[tokio::test]
    async fn webhook_checkout_link_for_unknown_user_dropped_but_acknowledged() {
        let db = Arc::new(MockDb::default());
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let body = serde_json::json!({
            "id": "evt_cs_ghost",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_456",
                "client_reference_id": "auth0|ghost",
                "customer": "cus_ghost"
            } }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;

        // Acknowledged so Stripe does not retry an event we can never match,
        // and nothing is invented locally for the unknown user.
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(db.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_unrecognized_event_acknowledged() {
        let db = Arc::new(MockDb::default());
        let state = test_state(db.clone(), Arc::new(MockStripeService::new()));

        let body = serde_json::json!({
            "id": "evt_other",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "customer": "cus_1" } }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*db.update_status_and_plan_calls.lock().unwrap(), 0);
        assert_eq!(*db.clear_subscription_calls.lock().unwrap(), 0);
    }
}
