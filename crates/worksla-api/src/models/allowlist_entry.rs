use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::DbRow;

/// One assignee permitted to appear in filtered views. Only `active`
/// entries participate in filtering; discovery seeds entries inactive so an
/// admin has to opt each one in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub id: i64,
    pub upstream_user_id: i64,
    pub display_name: String,
    pub active: bool,
}

impl AllowlistEntry {
    pub fn from_row(row: DbRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            upstream_user_id: row.try_get("upstream_user_id")?,
            display_name: row.try_get("display_name")?,
            active: row.try_get("active")?,
        })
    }
}
