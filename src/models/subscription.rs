use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};

/// Local four-value subscription status. The Stripe subscription object is
/// authoritative; this value is a cache derived from it via
/// [`SubscriptionStatus::from_provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Free,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Collapse Stripe's subscription status vocabulary onto the local enum.
    ///
    /// Total over arbitrary input: unrecognized statuses land on `Canceled`
    /// so an unknown value can never grant access.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "unpaid" | "incomplete" | "incomplete_expired" => {
                SubscriptionStatus::Canceled
            }
            _ => SubscriptionStatus::Canceled,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per user. `user_id` is the identity provider's opaque subject
/// string, not something we mint ourselves.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub plan_id: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl SubscriptionRecord {
    pub fn new(user_id: &str) -> Self {
        let now = time::OffsetDateTime::now_utc();
        Self {
            user_id: user_id.to_string(),
            stripe_customer_id: None,
            subscription_status: SubscriptionStatus::Free,
            plan_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
