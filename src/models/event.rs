use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published by the content service whenever a user finishes working on a content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgressedEvent {
    pub user_id: Uuid,
    pub content_id: Uuid,
    #[serde(default)]
    pub correctness: f64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub hints_used: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_complete: Option<i32>,
}

/// CloudEvents envelope as delivered by the pub/sub sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEvent<T> {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    pub data: Option<T>,
}
