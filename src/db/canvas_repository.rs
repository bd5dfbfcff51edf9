use async_trait::async_trait;
use uuid::Uuid;

use crate::models::canvas::{Canvas, CanvasUpdate, NewCanvas};

#[async_trait]
pub trait CanvasRepository: Send + Sync {
    async fn create_canvas(&self, new: &NewCanvas) -> Result<Canvas, sqlx::Error>;

    async fn list_canvases_for_user(&self, user_id: &str) -> Result<Vec<Canvas>, sqlx::Error>;

    /// Ownership is part of the key: a canvas belonging to another user is
    /// indistinguishable from a missing one.
    async fn find_canvas(
        &self,
        canvas_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Canvas>, sqlx::Error>;

    async fn update_canvas(
        &self,
        canvas_id: Uuid,
        update: &CanvasUpdate,
    ) -> Result<Option<Canvas>, sqlx::Error>;

    async fn delete_canvas(&self, canvas_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error>;

    async fn count_canvases_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error>;
}
