use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::DbRow;

/// A work item as held in the local cache table: the flattened form of one
/// upstream element. `raw` retains the full upstream payload for fields not
/// otherwise extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemRecord {
    pub id: i64,
    pub subject: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub kind: Option<String>,
    pub assignee_id: Option<i64>,
    pub assignee_name: Option<String>,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set by the repository on every write; never supplied by upstream.
    pub cached_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

impl WorkItemRecord {
    pub fn from_row(row: DbRow) -> Result<Self, sqlx::Error> {
        let raw_text: String = row.try_get("raw")?;
        Ok(Self {
            id: row.try_get("id")?,
            subject: row.try_get("subject")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            kind: row.try_get("kind")?,
            assignee_id: row.try_get("assignee_id")?,
            assignee_name: row.try_get("assignee_name")?,
            project_id: row.try_get("project_id")?,
            project_name: row.try_get("project_name")?,
            start_date: row.try_get("start_date")?,
            due_date: row.try_get("due_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            cached_at: row.try_get("cached_at")?,
            raw: serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// One resolved custom field on a work-item detail. Fields backed by a
/// custom-option resource additionally carry the option's display value and
/// id from the follow-up fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Fixed display label for known field keys (Thai per upstream config).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_id: Option<i64>,
}

/// The detail-endpoint view: the flat record plus description text and the
/// resolved custom-field map. Detail descriptions prefer the upstream `html`
/// variant; the cleaned plain-text derivative is computed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemDetail {
    #[serde(flatten)]
    pub record: WorkItemRecord,
    pub description: String,
    pub description_text: String,
    pub author_name: Option<String>,
    pub category: Option<String>,
    pub done_ratio: i64,
    pub custom_fields: BTreeMap<String, CustomField>,
}
