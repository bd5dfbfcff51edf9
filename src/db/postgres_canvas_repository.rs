use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::canvas_repository::CanvasRepository;
use crate::models::canvas::{Canvas, CanvasUpdate, NewCanvas};

pub struct PostgresCanvasRepository {
    pub pool: PgPool,
}

const SELECT_COLUMNS: &str = "id, user_id, canvas_type, title, project_name, author, canvas_date, comments, content, created_at, updated_at";

#[async_trait]
impl CanvasRepository for PostgresCanvasRepository {
    async fn create_canvas(&self, new: &NewCanvas) -> Result<Canvas, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, Canvas>(&format!(
            r#"
            INSERT INTO canvases (
                id, user_id, canvas_type, title, project_name, author,
                canvas_date, comments, content, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.user_id)
        .bind(new.canvas_type)
        .bind(&new.title)
        .bind(&new.project_name)
        .bind(&new.author)
        .bind(&new.canvas_date)
        .bind(&new.comments)
        .bind(&new.content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_canvases_for_user(&self, user_id: &str) -> Result<Vec<Canvas>, sqlx::Error> {
        sqlx::query_as::<_, Canvas>(&format!(
            "SELECT {SELECT_COLUMNS} FROM canvases WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_canvas(
        &self,
        canvas_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Canvas>, sqlx::Error> {
        sqlx::query_as::<_, Canvas>(&format!(
            "SELECT {SELECT_COLUMNS} FROM canvases WHERE id = $1 AND user_id = $2"
        ))
        .bind(canvas_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_canvas(
        &self,
        canvas_id: Uuid,
        update: &CanvasUpdate,
    ) -> Result<Option<Canvas>, sqlx::Error> {
        sqlx::query_as::<_, Canvas>(&format!(
            r#"
            UPDATE canvases
            SET title        = COALESCE($1, title),
                project_name = COALESCE($2, project_name),
                author       = COALESCE($3, author),
                canvas_date  = COALESCE($4, canvas_date),
                comments     = COALESCE($5, comments),
                content      = COALESCE($6, content),
                updated_at   = $7
            WHERE id = $8 AND user_id = $9
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(&update.title)
        .bind(&update.project_name)
        .bind(&update.author)
        .bind(&update.canvas_date)
        .bind(&update.comments)
        .bind(&update.content)
        .bind(OffsetDateTime::now_utc())
        .bind(canvas_id)
        .bind(&update.user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_canvas(&self, canvas_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM canvases WHERE id = $1 AND user_id = $2")
            .bind(canvas_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_canvases_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM canvases WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }
}
