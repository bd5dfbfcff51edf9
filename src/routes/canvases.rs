use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::canvas::{CanvasUpdate, NewCanvas};
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::entitlements::{can_create_canvas, PlanTier, FREE_CANVAS_LIMIT};

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

fn require_user_id(user_id: Option<&str>) -> Result<&str, Response> {
    match user_id.filter(|u| !u.is_empty()) {
        Some(u) => Ok(u),
        None => Err(JsonResponse::bad_request("Missing user_id").into_response()),
    }
}

// POST /api/canvases
pub async fn create_canvas(
    State(app_state): State<AppState>,
    Json(payload): Json<NewCanvas>,
) -> Response {
    if payload.user_id.is_empty() {
        return JsonResponse::bad_request("Missing user_id").into_response();
    }
    if payload.title.trim().is_empty() {
        return JsonResponse::bad_request("Missing title").into_response();
    }

    // Gate on the cached status; this is a presentation-level limit, not a
    // billing decision, so no live Stripe call is made here.
    let record = match app_state.subscriptions.upsert_user(&payload.user_id).await {
        Ok(record) => record,
        Err(err) => {
            error!(?err, user_id = payload.user_id, "failed to load subscription record");
            return JsonResponse::server_error("Could not create canvas").into_response();
        }
    };
    let tier = PlanTier::from(record.subscription_status);

    let existing = match app_state
        .canvases
        .count_canvases_for_user(&payload.user_id)
        .await
    {
        Ok(count) => count,
        Err(err) => {
            error!(?err, user_id = payload.user_id, "failed to count canvases");
            return JsonResponse::server_error("Could not create canvas").into_response();
        }
    };

    if !can_create_canvas(tier, existing) {
        warn!(
            user_id = payload.user_id,
            existing, "free tier canvas limit reached"
        );
        return JsonResponse::forbidden(&format!(
            "The free plan is limited to {FREE_CANVAS_LIMIT} canvases. Upgrade to premium to create more."
        ))
        .into_response();
    }

    match app_state.canvases.create_canvas(&payload).await {
        Ok(canvas) => Json(canvas).into_response(),
        Err(err) => {
            error!(?err, user_id = payload.user_id, "failed to create canvas");
            JsonResponse::server_error("Could not create canvas").into_response()
        }
    }
}

// GET /api/canvases?user_id=...
pub async fn list_canvases(
    State(app_state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_id = match require_user_id(query.user_id.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match app_state.canvases.list_canvases_for_user(user_id).await {
        Ok(canvases) => Json(canvases).into_response(),
        Err(err) => {
            error!(?err, user_id, "failed to list canvases");
            JsonResponse::server_error("Could not list canvases").into_response()
        }
    }
}

// GET /api/canvases/{canvas_id}?user_id=...
pub async fn get_canvas(
    State(app_state): State<AppState>,
    Path(canvas_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_id = match require_user_id(query.user_id.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match app_state.canvases.find_canvas(canvas_id, user_id).await {
        Ok(Some(canvas)) => Json(canvas).into_response(),
        Ok(None) => JsonResponse::not_found("Canvas not found").into_response(),
        Err(err) => {
            error!(?err, %canvas_id, user_id, "failed to fetch canvas");
            JsonResponse::server_error("Could not fetch canvas").into_response()
        }
    }
}

// PUT /api/canvases/{canvas_id}
pub async fn update_canvas(
    State(app_state): State<AppState>,
    Path(canvas_id): Path<Uuid>,
    Json(payload): Json<CanvasUpdate>,
) -> Response {
    if payload.user_id.is_empty() {
        return JsonResponse::bad_request("Missing user_id").into_response();
    }

    match app_state.canvases.update_canvas(canvas_id, &payload).await {
        Ok(Some(canvas)) => Json(canvas).into_response(),
        Ok(None) => JsonResponse::not_found("Canvas not found").into_response(),
        Err(err) => {
            error!(?err, %canvas_id, user_id = payload.user_id, "failed to update canvas");
            JsonResponse::server_error("Could not update canvas").into_response()
        }
    }
}

// DELETE /api/canvases/{canvas_id}?user_id=...
pub async fn delete_canvas(
    State(app_state): State<AppState>,
    Path(canvas_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_id = match require_user_id(query.user_id.as_deref()) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match app_state.canvases.delete_canvas(canvas_id, user_id).await {
        Ok(true) => JsonResponse::success("Canvas deleted").into_response(),
        Ok(false) => JsonResponse::not_found("Canvas not found").into_response(),
        Err(err) => {
            error!(?err, %canvas_id, user_id, "failed to delete canvas");
            JsonResponse::server_error("Could not delete canvas").into_response()
        }
    }
}
