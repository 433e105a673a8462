//! Persistent work-item cache: upsert-by-id writes from the sync engine,
//! filtered reads for listings and reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::db::DbPool;
use crate::models::WorkItemRecord;

/// Status labels that mean "done" for overdue/due-soon purposes. Upstream
/// reports status in English or Thai depending on instance configuration.
pub const CLOSED_STATUSES: &[&str] = &["Closed", "ดำเนินการเสร็จ"];

/// Filter predicates accepted by [`WorkItemRepo::query`] and friends. Date
/// bounds are inclusive; `search` matches subject or assignee name,
/// case-insensitively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkItemFilters {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub kind: Option<String>,
    pub assignee_id: Option<i64>,
    pub project_id: Option<i64>,
    pub start_date_from: Option<DateTime<Utc>>,
    pub start_date_to: Option<DateTime<Utc>>,
    pub due_date_from: Option<DateTime<Utc>>,
    pub due_date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

/// Aggregate counts for the stats endpoint. Rows with a null or empty
/// status/priority land in the "Unknown" bucket.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItemStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

const SORTABLE_COLUMNS: &[&str] = &[
    "id",
    "subject",
    "status",
    "priority",
    "kind",
    "assignee_name",
    "project_name",
    "start_date",
    "due_date",
    "created_at",
    "updated_at",
    "cached_at",
];

#[derive(Clone)]
pub struct WorkItemRepo {
    pool: DbPool,
}

impl WorkItemRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or fully update the row for `record.id`. Idempotent; the only
    /// write path for work-item rows. `cached_at` is stamped here.
    pub async fn upsert(&self, record: &WorkItemRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO work_items (
                id, subject, status, priority, kind,
                assignee_id, assignee_name, project_id, project_name,
                start_date, due_date, created_at, updated_at, cached_at, raw
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                subject = excluded.subject,
                status = excluded.status,
                priority = excluded.priority,
                kind = excluded.kind,
                assignee_id = excluded.assignee_id,
                assignee_name = excluded.assignee_name,
                project_id = excluded.project_id,
                project_name = excluded.project_name,
                start_date = excluded.start_date,
                due_date = excluded.due_date,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                cached_at = excluded.cached_at,
                raw = excluded.raw
            "#,
        )
        .bind(record.id)
        .bind(&record.subject)
        .bind(&record.status)
        .bind(&record.priority)
        .bind(&record.kind)
        .bind(record.assignee_id)
        .bind(&record.assignee_name)
        .bind(record.project_id)
        .bind(&record.project_name)
        .bind(record.start_date)
        .bind(record.due_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(Utc::now())
        .bind(record.raw.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_batch(&self, records: &[WorkItemRecord]) -> Result<(), sqlx::Error> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<WorkItemRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM work_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkItemRecord::from_row).transpose()
    }

    /// Filtered page of cached rows. An unrecognized `sort_field` is
    /// ignored; no sort field at all defaults to `updated_at` descending.
    /// A present allowlist narrows to allowed assignees plus unassigned
    /// rows; an empty allowlist leaves only the unassigned rows.
    pub async fn query(
        &self,
        offset: u64,
        limit: u64,
        filters: &WorkItemFilters,
        sort_field: Option<&str>,
        descending: bool,
        allowlist: Option<&[i64]>,
    ) -> Result<Vec<WorkItemRecord>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM work_items");
        push_predicates(&mut qb, filters, allowlist);

        let direction = if descending { "DESC" } else { "ASC" };
        match sort_field {
            None => {
                qb.push(" ORDER BY updated_at ");
                qb.push(direction);
            }
            Some(field) if SORTABLE_COLUMNS.contains(&field) => {
                qb.push(" ORDER BY ");
                qb.push(field);
                qb.push(" ");
                qb.push(direction);
            }
            Some(_) => {}
        }
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(WorkItemRecord::from_row).collect()
    }

    /// Row count under the same predicate set as [`Self::query`].
    pub async fn count(
        &self,
        filters: &WorkItemFilters,
        allowlist: Option<&[i64]>,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM work_items");
        push_predicates(&mut qb, filters, allowlist);
        let row = qb.build().fetch_one(&self.pool).await?;
        row.try_get("n")
    }

    /// Open items whose due date has passed, soonest-overdue first.
    pub async fn get_overdue(&self, limit: u64) -> Result<Vec<WorkItemRecord>, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM work_items WHERE due_date IS NOT NULL AND due_date < ",
        );
        qb.push_bind(Utc::now());
        push_not_closed(&mut qb);
        qb.push(" ORDER BY due_date ASC LIMIT ");
        qb.push_bind(limit as i64);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(WorkItemRecord::from_row).collect()
    }

    /// Open items due within the next `days` days, inclusive, ascending.
    pub async fn get_due_soon(
        &self,
        days: i64,
        limit: u64,
    ) -> Result<Vec<WorkItemRecord>, sqlx::Error> {
        let now = Utc::now();
        let horizon = now + Duration::days(days);
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM work_items WHERE due_date >= ");
        qb.push_bind(now);
        qb.push(" AND due_date <= ");
        qb.push_bind(horizon);
        push_not_closed(&mut qb);
        qb.push(" ORDER BY due_date ASC LIMIT ");
        qb.push_bind(limit as i64);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(WorkItemRecord::from_row).collect()
    }

    /// Total plus per-status and per-priority counts under `filters`,
    /// narrowed by the allowlist like [`Self::query`].
    pub async fn get_stats(
        &self,
        filters: &WorkItemFilters,
        allowlist: Option<&[i64]>,
    ) -> Result<WorkItemStats, sqlx::Error> {
        let total = self.count(filters, allowlist).await?;
        let by_status = self.grouped_counts("status", filters, allowlist).await?;
        let by_priority = self.grouped_counts("priority", filters, allowlist).await?;
        Ok(WorkItemStats {
            total,
            by_status,
            by_priority,
        })
    }

    async fn grouped_counts(
        &self,
        column: &str,
        filters: &WorkItemFilters,
        allowlist: Option<&[i64]>,
    ) -> Result<BTreeMap<String, i64>, sqlx::Error> {
        // column is one of two literals chosen by get_stats, never user input
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COALESCE(NULLIF({column}, ''), 'Unknown') AS k, COUNT(*) AS n FROM work_items",
        ));
        push_predicates(&mut qb, filters, allowlist);
        qb.push(" GROUP BY k");
        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = BTreeMap::new();
        for row in rows {
            out.insert(row.try_get("k")?, row.try_get("n")?);
        }
        Ok(out)
    }
}

fn push_predicates(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filters: &WorkItemFilters,
    allowlist: Option<&[i64]>,
) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = &filters.status {
        qb.push(" AND status = ");
        qb.push_bind(status.clone());
    }
    if let Some(priority) = &filters.priority {
        qb.push(" AND priority = ");
        qb.push_bind(priority.clone());
    }
    if let Some(kind) = &filters.kind {
        qb.push(" AND kind = ");
        qb.push_bind(kind.clone());
    }
    if let Some(assignee_id) = filters.assignee_id {
        qb.push(" AND assignee_id = ");
        qb.push_bind(assignee_id);
    }
    if let Some(project_id) = filters.project_id {
        qb.push(" AND project_id = ");
        qb.push_bind(project_id);
    }
    if let Some(from) = filters.start_date_from {
        qb.push(" AND start_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.start_date_to {
        qb.push(" AND start_date <= ");
        qb.push_bind(to);
    }
    if let Some(from) = filters.due_date_from {
        qb.push(" AND due_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.due_date_to {
        qb.push(" AND due_date <= ");
        qb.push_bind(to);
    }
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(subject) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(COALESCE(assignee_name, '')) LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    if let Some(ids) = allowlist {
        // Unassigned rows always pass; an empty active set admits only them.
        if ids.is_empty() {
            qb.push(" AND assignee_id IS NULL");
        } else {
            qb.push(" AND (assignee_id IS NULL OR assignee_id IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
            qb.push("))");
        }
    }
}

fn push_not_closed(qb: &mut QueryBuilder<'_, Sqlite>) {
    // Plain NOT IN: null-status rows fail the predicate and are excluded.
    qb.push(" AND status NOT IN (");
    let mut sep = qb.separated(", ");
    for status in CLOSED_STATUSES {
        sep.push_bind(*status);
    }
    qb.push(")");
}
