use async_trait::async_trait;

use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};

/// Persistence seam for the per-user subscription cache. The Stripe side is
/// authoritative; every write here records something Stripe already decided.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Fetch the record for a user, creating a fresh `free` row on first
    /// sight. Records are created implicitly the first time a user shows up.
    async fn upsert_user(&self, user_id: &str) -> Result<SubscriptionRecord, sqlx::Error>;

    /// Link a Stripe customer to a user after checkout completes.
    /// Returns false when no local record matches the user.
    async fn set_stripe_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error>;

    /// Apply a webhook-driven status/plan change, keyed by customer id.
    /// Returns false when no local record matches the customer.
    async fn update_status_and_plan_by_customer(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
        plan_id: Option<&str>,
    ) -> Result<bool, sqlx::Error>;

    /// Reset a customer's record to `free` and clear the plan, for
    /// subscription deletion. Returns false when no local record matches.
    async fn clear_subscription_by_customer(&self, customer_id: &str)
        -> Result<bool, sqlx::Error>;

    /// Write-through used by the status resolver when the cached status has
    /// drifted from live Stripe state.
    async fn update_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), sqlx::Error>;
}
