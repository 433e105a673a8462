use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parsed change line from a journal entry's details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetail {
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// The cleaned source text the triple was parsed from.
    pub text: String,
}

/// A journal entry for timeline rendering: returned oldest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
    pub version: Option<i64>,
    pub details: Vec<ChangeDetail>,
}

/// A plain activity entry: returned newest-first, details left as cleaned
/// text lines. The opposite default order from journals is intentional and
/// load-bearing for existing callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
    pub version: Option<i64>,
    pub details: Vec<String>,
}
