use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::canvas_repository::CanvasRepository;
use crate::db::subscription_repository::SubscriptionRepository;
use crate::models::canvas::{Canvas, CanvasUpdate, NewCanvas};
use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};

/// In-memory double for both repositories. Call counters let tests assert
/// on side effects the way the handlers observe them.
pub struct MockDb {
    pub should_fail: bool,
    pub records: Mutex<HashMap<String, SubscriptionRecord>>,
    pub canvases: Mutex<Vec<Canvas>>,
    pub update_status_calls: Mutex<usize>,
    pub update_status_and_plan_calls: Mutex<usize>,
    pub clear_subscription_calls: Mutex<usize>,
}

impl Default for MockDb {
    fn default() -> Self {
        Self {
            should_fail: false,
            records: Mutex::new(HashMap::new()),
            canvases: Mutex::new(Vec::new()),
            update_status_calls: Mutex::new(0),
            update_status_and_plan_calls: Mutex::new(0),
            clear_subscription_calls: Mutex::new(0),
        }
    }
}

impl MockDb {
    pub fn with_record(record: SubscriptionRecord) -> Self {
        let db = Self::default();
        db.records
            .lock()
            .unwrap()
            .insert(record.user_id.clone(), record);
        db
    }

    fn fail_if_configured(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MockDb {
    async fn upsert_user(&self, user_id: &str) -> Result<SubscriptionRecord, sqlx::Error> {
        self.fail_if_configured()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(user_id.to_string())
            .or_insert_with(|| SubscriptionRecord::new(user_id));
        Ok(record.clone())
    }

    async fn set_stripe_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error> {
        self.fail_if_configured()?;
        match self.records.lock().unwrap().get_mut(user_id) {
            Some(record) => {
                record.stripe_customer_id = Some(customer_id.to_string());
                record.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status_and_plan_by_customer(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
        plan_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        self.fail_if_configured()?;
        *self.update_status_and_plan_calls.lock().unwrap() += 1;
        let mut records = self.records.lock().unwrap();
        match records
            .values_mut()
            .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
        {
            Some(record) => {
                record.subscription_status = status;
                record.plan_id = plan_id.map(|p| p.to_string());
                record.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_subscription_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error> {
        self.fail_if_configured()?;
        *self.clear_subscription_calls.lock().unwrap() += 1;
        let mut records = self.records.lock().unwrap();
        match records
            .values_mut()
            .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
        {
            Some(record) => {
                record.subscription_status = SubscriptionStatus::Free;
                record.plan_id = None;
                record.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), sqlx::Error> {
        self.fail_if_configured()?;
        *self.update_status_calls.lock().unwrap() += 1;
        if let Some(record) = self.records.lock().unwrap().get_mut(user_id) {
            record.subscription_status = status;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}

#[async_trait]
impl CanvasRepository for MockDb {
    async fn create_canvas(&self, new: &NewCanvas) -> Result<Canvas, sqlx::Error> {
        self.fail_if_configured()?;
        let now = OffsetDateTime::now_utc();
        let canvas = Canvas {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            canvas_type: new.canvas_type,
            title: new.title.clone(),
            project_name: new.project_name.clone(),
            author: new.author.clone(),
            canvas_date: new.canvas_date.clone(),
            comments: new.comments.clone(),
            content: new.content.clone(),
            created_at: now,
            updated_at: now,
        };
        self.canvases.lock().unwrap().push(canvas.clone());
        Ok(canvas)
    }

    async fn list_canvases_for_user(&self, user_id: &str) -> Result<Vec<Canvas>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .canvases
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_canvas(
        &self,
        canvas_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Canvas>, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .canvases
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == canvas_id && c.user_id == user_id)
            .cloned())
    }

    async fn update_canvas(
        &self,
        canvas_id: Uuid,
        update: &CanvasUpdate,
    ) -> Result<Option<Canvas>, sqlx::Error> {
        self.fail_if_configured()?;
        let mut canvases = self.canvases.lock().unwrap();
        let Some(canvas) = canvases
            .iter_mut()
            .find(|c| c.id == canvas_id && c.user_id == update.user_id)
        else {
            return Ok(None);
        };
        if let Some(title) = &update.title {
            canvas.title = title.clone();
        }
        if let Some(project_name) = &update.project_name {
            canvas.project_name = Some(project_name.clone());
        }
        if let Some(author) = &update.author {
            canvas.author = Some(author.clone());
        }
        if let Some(canvas_date) = &update.canvas_date {
            canvas.canvas_date = Some(canvas_date.clone());
        }
        if let Some(comments) = &update.comments {
            canvas.comments = Some(comments.clone());
        }
        if let Some(content) = &update.content {
            canvas.content = content.clone();
        }
        canvas.updated_at = OffsetDateTime::now_utc();
        Ok(Some(canvas.clone()))
    }

    async fn delete_canvas(&self, canvas_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        self.fail_if_configured()?;
        let mut canvases = self.canvases.lock().unwrap();
        let before = canvases.len();
        canvases.retain(|c| !(c.id == canvas_id && c.user_id == user_id));
        Ok(canvases.len() < before)
    }

    async fn count_canvases_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        self.fail_if_configured()?;
        Ok(self
            .canvases
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .count() as i64)
    }
}
