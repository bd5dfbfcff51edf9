use crate::config::Config;
use crate::db::{
    canvas_repository::CanvasRepository, subscription_repository::SubscriptionRepository,
};
use crate::services::stripe::StripeService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub canvases: Arc<dyn CanvasRepository>,
    pub stripe: Arc<dyn StripeService>,
    pub config: Arc<Config>,
}
