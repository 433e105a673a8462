//! In-memory snapshot of the active assignee allowlist.
//!
//! Unassigned items always pass. When the snapshot narrows a live upstream
//! query instead of post-filtering, an empty active set must yield zero
//! results — it is a filter with no members, not the absence of a filter.

use std::collections::HashSet;

use crate::models::WorkItemRecord;

#[derive(Debug, Clone, Default)]
pub struct AllowlistFilter {
    active: HashSet<i64>,
}

impl AllowlistFilter {
    pub fn new(active_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            active: active_ids.into_iter().collect(),
        }
    }

    /// A null assignee always passes; otherwise membership decides.
    pub fn is_allowed(&self, assignee_id: Option<i64>) -> bool {
        match assignee_id {
            None => true,
            Some(id) => self.active.contains(&id),
        }
    }

    /// Order-preserving retention of allowed records.
    pub fn apply(&self, records: Vec<WorkItemRecord>) -> Vec<WorkItemRecord> {
        records
            .into_iter()
            .filter(|r| self.is_allowed(r.assignee_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active ids in sorted order, for SQL `IN` predicates.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.active.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Comma-separated id list for the upstream `assignee` filter. Callers
    /// must short-circuit to an empty result when [`Self::is_empty`] —
    /// upstream would treat an empty value list as no filter at all.
    pub fn upstream_filter_value(&self) -> String {
        self.ids()
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, assignee: Option<i64>) -> WorkItemRecord {
        WorkItemRecord {
            id,
            subject: String::new(),
            status: None,
            priority: None,
            kind: None,
            assignee_id: assignee,
            assignee_name: None,
            project_id: None,
            project_name: None,
            start_date: None,
            due_date: None,
            created_at: None,
            updated_at: None,
            cached_at: None,
            raw: json!(null),
        }
    }

    #[test]
    fn unassigned_always_passes() {
        let filter = AllowlistFilter::new([]);
        assert!(filter.is_allowed(None));
        assert!(!filter.is_allowed(Some(5)));
    }

    #[test]
    fn apply_preserves_order() {
        let filter = AllowlistFilter::new([2, 4]);
        let records = vec![
            record(1, Some(2)),
            record(2, Some(3)),
            record(3, None),
            record(4, Some(4)),
        ];
        let kept: Vec<i64> = filter.apply(records).iter().map(|r| r.id).collect();
        assert_eq!(kept, vec![1, 3, 4]);
    }

    #[test]
    fn upstream_filter_value_is_sorted_csv() {
        let filter = AllowlistFilter::new([9, 3, 7]);
        assert_eq!(filter.upstream_filter_value(), "3,7,9");
        assert!(AllowlistFilter::new([]).upstream_filter_value().is_empty());
    }
}
