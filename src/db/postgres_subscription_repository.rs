use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::subscription_repository::SubscriptionRepository;
use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};

pub struct PostgresSubscriptionRepository {
    pub pool: PgPool,
}

const SELECT_COLUMNS: &str = "user_id, stripe_customer_id, subscription_status, plan_id, created_at, updated_at";

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn upsert_user(&self, user_id: &str) -> Result<SubscriptionRecord, sqlx::Error> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            r#"
            INSERT INTO subscriptions (user_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_stripe_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriptions SET stripe_customer_id = $1, updated_at = $2 WHERE user_id = $3",
        )
        .bind(customer_id)
        .bind(OffsetDateTime::now_utc())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status_and_plan_by_customer(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
        plan_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET subscription_status = $1, plan_id = $2, updated_at = $3
            WHERE stripe_customer_id = $4
            "#,
        )
        .bind(status)
        .bind(plan_id)
        .bind(OffsetDateTime::now_utc())
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_subscription_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET subscription_status = $1, plan_id = NULL, updated_at = $2
            WHERE stripe_customer_id = $3
            "#,
        )
        .bind(SubscriptionStatus::Free)
        .bind(OffsetDateTime::now_utc())
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subscriptions SET subscription_status = $1, updated_at = $2 WHERE user_id = $3",
        )
        .bind(status)
        .bind(OffsetDateTime::now_utc())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
