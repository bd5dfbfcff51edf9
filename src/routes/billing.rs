use axum::Json;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::models::subscription::SubscriptionStatus;
use crate::responses::JsonResponse;
use crate::services::stripe::CreateCheckoutSessionRequest;
use crate::state::AppState;
use crate::utils::entitlements::PlanTier;

#[derive(Deserialize)]
pub struct CheckoutPayload {
    pub price_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusPayload {
    pub user_id: Option<String>,
}

fn caller_origin(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(axum::http::header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .unwrap_or(fallback)
        .trim_end_matches('/')
        .to_string()
}

// POST /api/billing/checkout-session
pub async fn create_checkout_session(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutPayload>,
) -> Response {
    let price_id = match payload.price_id.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => p,
        None => return JsonResponse::bad_request("Missing price_id").into_response(),
    };

    // Redirect targets are scoped to whoever initiated checkout.
    let origin = caller_origin(&headers, &app_state.config.frontend_origin);

    // Reuse the linked Stripe customer when the user already has one, so a
    // re-subscribing user does not end up with a second customer object.
    let mut customer: Option<String> = None;
    if let Some(user_id) = payload.user_id.as_deref().filter(|u| !u.is_empty()) {
        match app_state.subscriptions.upsert_user(user_id).await {
            Ok(record) => customer = record.stripe_customer_id,
            Err(err) => {
                error!(?err, user_id, "failed to load subscription record for checkout");
                return JsonResponse::server_error("Could not start checkout").into_response();
            }
        }
    }

    let req = CreateCheckoutSessionRequest {
        success_url: format!("{origin}/account?checkout=success"),
        cancel_url: format!("{origin}/pricing?checkout=canceled"),
        price_id: price_id.to_string(),
        quantity: 1,
        client_reference_id: payload.user_id.clone(),
        customer,
    };

    match app_state.stripe.create_checkout_session(req).await {
        Ok(session) => {
            info!(session_id = session.id, "created checkout session");
            Json(json!({ "sessionId": session.id, "url": session.url })).into_response()
        }
        Err(err) => {
            error!(?err, "stripe checkout session creation failed");
            let message = format!("Checkout failed: {err}");
            // Relay the provider's own status when it gave one; otherwise
            // this is our upstream misbehaving.
            match err
                .upstream_status()
                .and_then(|code| StatusCode::from_u16(code).ok())
            {
                Some(code) => JsonResponse::error(code, &message).into_response(),
                None => JsonResponse::bad_gateway(&message).into_response(),
            }
        }
    }
}

// POST /api/billing/subscription-status
pub async fn subscription_status(
    State(app_state): State<AppState>,
    Json(payload): Json<StatusPayload>,
) -> Response {
    let user_id = match payload.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(u) => u,
        None => return JsonResponse::bad_request("Missing user_id").into_response(),
    };

    let status = resolve_subscription_status(&app_state, user_id).await;
    let tier = PlanTier::from(status);

    Json(json!({ "status": status.as_str(), "tier": tier.as_str() })).into_response()
}

/// Reconcile the cached status with live Stripe state.
///
/// Fail-closed by construction: every error path degrades to `Free`, so an
/// outage can lock a premium user out of gated features but can never grant
/// access that was not paid for.
pub(crate) async fn resolve_subscription_status(
    app_state: &AppState,
    user_id: &str,
) -> SubscriptionStatus {
    // Upsert covers the implicit record creation on first sight.
    let record = match app_state.subscriptions.upsert_user(user_id).await {
        Ok(record) => record,
        Err(err) => {
            error!(?err, user_id, "failed to load subscription record");
            return SubscriptionStatus::Free;
        }
    };

    // Never started checkout: free, and no reason to call Stripe.
    let Some(customer_id) = record.stripe_customer_id.as_deref() else {
        return SubscriptionStatus::Free;
    };

    let subs = match app_state
        .stripe
        .list_subscriptions_for_customer(customer_id)
        .await
    {
        Ok(subs) => subs,
        Err(err) => {
            error!(?err, user_id, customer_id, "failed to list stripe subscriptions");
            return SubscriptionStatus::Free;
        }
    };

    // Take the first subscription in Stripe's default ordering; our checkout
    // flow only ever creates one per customer. A customer with no
    // subscriptions at all is free.
    let live_status = subs
        .first()
        .map(|sub| SubscriptionStatus::from_provider(&sub.status))
        .unwrap_or(SubscriptionStatus::Free);

    if live_status != record.subscription_status {
        warn!(
            user_id,
            cached = record.subscription_status.as_str(),
            live = live_status.as_str(),
            "cached subscription status drifted; writing through"
        );
        if let Err(err) = app_state
            .subscriptions
            .update_status(user_id, live_status)
            .await
        {
            error!(?err, user_id, "failed to write through subscription status");
            return SubscriptionStatus::Free;
        }
    }

    live_status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::MockDb;
    use crate::models::subscription::SubscriptionRecord;
    use crate::services::stripe::MockStripeService;
    use crate::state::test_support::test_state;
    use axum::extract::State as AxumState;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::Arc;

    fn record_with_customer(
        user_id: &str,
        customer_id: &str,
        status: SubscriptionStatus,
    ) -> SubscriptionRecord {
        let mut record = SubscriptionRecord::new(user_id);
        record.stripe_customer_id = Some(customer_id.to_string());
        record.subscription_status = status;
        record
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn checkout_missing_price_id_rejected_before_stripe_call() {
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(Arc::new(MockDb::default()), stripe.clone());

        let resp = create_checkout_session(
            AxumState(state),
            HeaderMap::new(),
            Json(CheckoutPayload {
                price_id: None,
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*stripe.checkout_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn checkout_scopes_urls_to_caller_origin() {
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(Arc::new(MockDb::default()), stripe.clone());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::ORIGIN,
            HeaderValue::from_static("https://canvas.example.org"),
        );

        let resp = create_checkout_session(
            AxumState(state),
            headers,
            Json(CheckoutPayload {
                price_id: Some("price_premium_monthly".into()),
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert!(json["sessionId"].as_str().unwrap().starts_with("cs_test_"));

        let captured = stripe.last_create_requests.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(
            captured[0].success_url,
            "https://canvas.example.org/account?checkout=success"
        );
        assert_eq!(
            captured[0].cancel_url,
            "https://canvas.example.org/pricing?checkout=canceled"
        );
        assert_eq!(captured[0].client_reference_id.as_deref(), Some("auth0|u1"));
    }

    #[tokio::test]
    async fn checkout_reuses_linked_customer() {
        let db = Arc::new(MockDb::with_record(record_with_customer(
            "auth0|u1",
            "cus_existing",
            SubscriptionStatus::Canceled,
        )));
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(db, stripe.clone());

        let resp = create_checkout_session(
            AxumState(state),
            HeaderMap::new(),
            Json(CheckoutPayload {
                price_id: Some("price_premium_monthly".into()),
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = stripe.last_create_requests.lock().unwrap();
        assert_eq!(captured[0].customer.as_deref(), Some("cus_existing"));
    }

    #[tokio::test]
    async fn checkout_statusless_stripe_error_is_bad_gateway() {
        let stripe = Arc::new(MockStripeService::new().failing_checkout());
        let state = test_state(Arc::new(MockDb::default()), stripe);

        let resp = create_checkout_session(
            AxumState(state),
            HeaderMap::new(),
            Json(CheckoutPayload {
                price_id: Some("price_bogus".into()),
                user_id: None,
            }),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn checkout_relays_upstream_status_and_message() {
        let stripe = Arc::new(MockStripeService::new().failing_checkout_with_status(400));
        let state = test_state(Arc::new(MockDb::default()), stripe);

        let resp = create_checkout_session(
            AxumState(state),
            HeaderMap::new(),
            Json(CheckoutPayload {
                price_id: Some("price_bogus".into()),
                user_id: None,
            }),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("No such price"));
    }

    #[tokio::test]
    async fn status_missing_user_id_rejected() {
        let state = test_state(
            Arc::new(MockDb::default()),
            Arc::new(MockStripeService::new()),
        );
        let resp =
            subscription_status(AxumState(state), Json(StatusPayload { user_id: None })).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_without_customer_is_free_with_no_stripe_call() {
        let db = Arc::new(MockDb::default());
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(db.clone(), stripe.clone());

        let resp = subscription_status(
            AxumState(state),
            Json(StatusPayload {
                user_id: Some("auth0|new-user".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "free");
        assert_eq!(json["tier"], "free");
        assert_eq!(*stripe.list_subscription_calls.lock().unwrap(), 0);

        // First sight also created the record.
        assert!(db.records.lock().unwrap().contains_key("auth0|new-user"));
    }

    #[tokio::test]
    async fn status_writes_through_when_cache_drifted() {
        let db = Arc::new(MockDb::with_record(record_with_customer(
            "auth0|u1",
            "cus_1",
            SubscriptionStatus::Canceled,
        )));
        let stripe = Arc::new(
            MockStripeService::new().with_subscription("active", "price_premium_monthly"),
        );
        let state = test_state(db.clone(), stripe.clone());

        let resp = subscription_status(
            AxumState(state),
            Json(StatusPayload {
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "active");
        assert_eq!(json["tier"], "premium");

        assert_eq!(*stripe.list_subscription_calls.lock().unwrap(), 1);
        assert_eq!(*db.update_status_calls.lock().unwrap(), 1);
        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn status_skips_write_when_cache_matches() {
        let db = Arc::new(MockDb::with_record(record_with_customer(
            "auth0|u1",
            "cus_1",
            SubscriptionStatus::Active,
        )));
        let stripe = Arc::new(
            MockStripeService::new().with_subscription("active", "price_premium_monthly"),
        );
        let state = test_state(db.clone(), stripe);

        let resp = subscription_status(
            AxumState(state),
            Json(StatusPayload {
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*db.update_status_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn status_degrades_to_free_when_stripe_unreachable() {
        let db = Arc::new(MockDb::with_record(record_with_customer(
            "auth0|u1",
            "cus_1",
            SubscriptionStatus::Active,
        )));
        let stripe = Arc::new(MockStripeService::new().failing_subscription_list());
        let state = test_state(db.clone(), stripe);

        let resp = subscription_status(
            AxumState(state),
            Json(StatusPayload {
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "free");
        // Degraded answer is not written back; the cache keeps its value.
        let record = db.records.lock().unwrap().get("auth0|u1").cloned().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn status_with_no_live_subscriptions_collapses_to_free() {
        let db = Arc::new(MockDb::with_record(record_with_customer(
            "auth0|u1",
            "cus_1",
            SubscriptionStatus::Active,
        )));
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(db.clone(), stripe);

        let resp = subscription_status(
            AxumState(state),
            Json(StatusPayload {
                user_id: Some("auth0|u1".into()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "free");
        assert_eq!(*db.update_status_calls.lock().unwrap(), 1);
    }
}
