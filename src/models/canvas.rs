use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "canvas_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CanvasType {
    BusinessModel,
    ValueProposition,
    Swot,
    EmpathyMap,
    Pestel,
}

impl fmt::Display for CanvasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CanvasType::BusinessModel => "business_model",
            CanvasType::ValueProposition => "value_proposition",
            CanvasType::Swot => "swot",
            CanvasType::EmpathyMap => "empathy_map",
            CanvasType::Pestel => "pestel",
        };
        write!(f, "{}", s)
    }
}

/// A stored canvas document. `content` is free-form JSON keyed by section
/// name (e.g. "key_partners", "value_propositions" for a Business Model
/// Canvas); the backend never interprets section contents.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Canvas {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub canvas_type: CanvasType,
    pub title: String,
    pub project_name: Option<String>,
    pub author: Option<String>,
    pub canvas_date: Option<String>,
    pub comments: Option<String>,
    pub content: serde_json::Value,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct NewCanvas {
    pub user_id: String,
    pub canvas_type: CanvasType,
    pub title: String,
    pub project_name: Option<String>,
    pub author: Option<String>,
    pub canvas_date: Option<String>,
    pub comments: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CanvasUpdate {
    pub user_id: String,
    pub title: Option<String>,
    pub project_name: Option<String>,
    pub author: Option<String>,
    pub canvas_date: Option<String>,
    pub comments: Option<String>,
    pub content: Option<serde_json::Value>,
}
