use serde::{Deserialize, Serialize};

use crate::models::subscription::SubscriptionStatus;

/// Stored canvases allowed on the free tier. Premium is unlimited.
pub const FREE_CANVAS_LIMIT: i64 = 3;

/// The two-tier simplification the feature gates care about. Only a
/// currently-paid subscription unlocks premium; `past_due` and `canceled`
/// gate exactly like `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, PlanTier::Premium)
    }
}

impl From<SubscriptionStatus> for PlanTier {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Active => PlanTier::Premium,
            SubscriptionStatus::Free
            | SubscriptionStatus::PastDue
            | SubscriptionStatus::Canceled => PlanTier::Free,
        }
    }
}

/// Whether a user on `tier` may create another canvas given how many they
/// already have.
pub fn can_create_canvas(tier: PlanTier, existing: i64) -> bool {
    tier.is_premium() || existing < FREE_CANVAS_LIMIT
}
