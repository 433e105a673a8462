use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::DbRow;

/// A key/value configuration row. Values are arbitrary JSON; keys follow a
/// dotted namespace convention (`openproject.base_url`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
}

impl Setting {
    pub fn from_row(row: DbRow) -> Result<Self, sqlx::Error> {
        let value_text: String = row.try_get("value")?;
        Ok(Self {
            key: row.try_get("key")?,
            value: serde_json::from_str(&value_text).unwrap_or(serde_json::Value::Null),
            description: row.try_get("description")?,
        })
    }
}
