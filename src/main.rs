mod config;
mod db;
mod models;
mod responses;
mod routes;
mod services;
mod state;
mod utils;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::http::Method;
use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use config::Config;
use db::postgres_canvas_repository::PostgresCanvasRepository;
use db::postgres_subscription_repository::PostgresSubscriptionRepository;
use responses::JsonResponse;
use routes::billing::{create_checkout_session, subscription_status};
use routes::canvases::{create_canvas, delete_canvas, get_canvas, list_canvases, update_canvas};
use routes::stripe::webhook;
use services::stripe::LiveStripeService;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::{
    canvas_repository::CanvasRepository, subscription_repository::SubscriptionRepository,
};
use crate::services::stripe::StripeService;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        // Default: allow short bursts during client polling
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Background task to cleanup old IPs
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Arc::new(Config::from_env());

    let pg_pool = establish_connection(&config.database_url).await;
    let subscription_repo = Arc::new(PostgresSubscriptionRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn SubscriptionRepository>;
    let canvas_repo = Arc::new(PostgresCanvasRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn CanvasRepository>;

    // Injected rather than global so handlers can run against a test double.
    let stripe = Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;

    let state = AppState {
        subscriptions: subscription_repo,
        canvases: canvas_repo,
        stripe,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let billing_routes = Router::new()
        .route("/checkout-session", post(create_checkout_session))
        .route("/subscription-status", post(subscription_status));

    let canvas_routes = Router::new()
        .route("/", post(create_canvas).get(list_canvases))
        .route(
            "/{canvas_id}",
            get(get_canvas).put(update_canvas).delete(delete_canvas),
        );

    // Webhook route: Stripe posts raw bytes here; no CORS restrictions apply
    // and the governor must not rate limit the provider's retries.
    let webhook_routes = Router::new().route("/webhook", post(webhook));

    let app = Router::new()
        .route("/", get(root))
        .nest(
            "/api/billing",
            billing_routes.layer(GovernorLayer {
                config: governor_conf.clone(),
            }),
        )
        .nest(
            "/api/canvases",
            canvas_routes.layer(GovernorLayer {
                config: governor_conf.clone(),
            }),
        )
        .nest("/api/stripe", webhook_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await.unwrap();
    info!("Running at http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Hello, Canvasboard!").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("Successfully connected to the database");
    pool
}
