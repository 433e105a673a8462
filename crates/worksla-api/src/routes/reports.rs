//! SLA and productivity summaries computed over the cached table.
//!
//! "On time" is defined as `updated_at <= due_date`, evaluated only when
//! both are set; items missing either are counted but not classified.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::allowlist::AllowlistFilter;
use crate::error::ApiError;
use crate::models::WorkItemRecord;
use crate::repo::work_items::CLOSED_STATUSES;
use crate::repo::WorkItemFilters;
use crate::routes::work_items::ListParams;
use crate::state::AppState;

// Reports read the whole filtered set in one page. Far above any realistic
// cache size for a single upstream project.
const REPORT_ROW_LIMIT: u64 = 10_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/sla", get(sla))
        .route("/reports/productivity", get(productivity))
}

fn is_closed(record: &WorkItemRecord) -> bool {
    record
        .status
        .as_deref()
        .is_some_and(|s| CLOSED_STATUSES.contains(&s))
}

fn is_on_time(record: &WorkItemRecord) -> Option<bool> {
    match (record.updated_at, record.due_date) {
        (Some(updated), Some(due)) => Some(updated <= due),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct SlaReport {
    pub total: u64,
    pub with_due_date: u64,
    pub on_time: u64,
    pub overdue: u64,
    pub closed: u64,
    /// on_time over the full reported total, as a percentage rounded to two
    /// decimals; unclassifiable items count against it.
    pub sla_percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct ProductivityRow {
    pub assignee_id: Option<i64>,
    pub assignee_name: String,
    pub total: u64,
    pub closed: u64,
    pub open: u64,
    pub overdue: u64,
}

/// Reports default to the trailing 30 days of started items: a missing end
/// of the window is "now", a missing start is 30 days before the end. Items
/// with no start date fall outside any window and need explicit bounds to
/// appear.
fn windowed_filters(params: &ListParams) -> WorkItemFilters {
    let mut filters = params.filters();
    let end = filters.start_date_to.unwrap_or_else(Utc::now);
    filters.start_date_to = Some(end);
    if filters.start_date_from.is_none() {
        filters.start_date_from = Some(end - Duration::days(30));
    }
    filters
}

async fn fetch_rows(
    state: &AppState,
    params: &ListParams,
) -> Result<Vec<WorkItemRecord>, ApiError> {
    let allow_ids = if params.apply_allowlist {
        Some(AllowlistFilter::new(state.assignees.active_ids().await?).ids())
    } else {
        None
    };
    let rows = state
        .work_items
        .query(
            0,
            REPORT_ROW_LIMIT,
            &windowed_filters(params),
            None,
            true,
            allow_ids.as_deref(),
        )
        .await?;
    Ok(rows)
}

async fn sla(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SlaReport>, ApiError> {
    let rows = fetch_rows(&state, &params).await?;
    let mut report = SlaReport {
        total: rows.len() as u64,
        with_due_date: 0,
        on_time: 0,
        overdue: 0,
        closed: 0,
        sla_percentage: 0.0,
    };
    for row in &rows {
        if row.due_date.is_some() {
            report.with_due_date += 1;
        }
        if is_closed(row) {
            report.closed += 1;
        }
        match is_on_time(row) {
            Some(true) => report.on_time += 1,
            Some(false) => report.overdue += 1,
            None => {}
        }
    }
    if report.total > 0 {
        let pct = report.on_time as f64 / report.total as f64 * 100.0;
        report.sla_percentage = (pct * 100.0).round() / 100.0;
    }
    Ok(Json(report))
}

async fn productivity(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProductivityRow>>, ApiError> {
    let rows = fetch_rows(&state, &params).await?;
    let now = Utc::now();
    let mut grouped: BTreeMap<Option<i64>, ProductivityRow> = BTreeMap::new();
    for row in &rows {
        let entry = grouped
            .entry(row.assignee_id)
            .or_insert_with(|| ProductivityRow {
                assignee_id: row.assignee_id,
                assignee_name: row
                    .assignee_name
                    .clone()
                    .unwrap_or_else(|| "Unassigned".to_string()),
                total: 0,
                closed: 0,
                open: 0,
                overdue: 0,
            });
        entry.total += 1;
        if is_closed(row) {
            entry.closed += 1;
        } else {
            entry.open += 1;
        }
        // Overdue here means the deadline has passed on a still-open item.
        if !is_closed(row) && row.due_date.is_some_and(|due| due < now) {
            entry.overdue += 1;
        }
    }
    Ok(Json(grouped.into_values().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(status: Option<&str>, updated: Option<i64>, due: Option<i64>) -> WorkItemRecord {
        let day = |d: i64| Utc.with_ymd_and_hms(2024, 1, d as u32, 0, 0, 0).unwrap();
        WorkItemRecord {
            id: 1,
            subject: String::new(),
            status: status.map(str::to_string),
            priority: None,
            kind: None,
            assignee_id: None,
            assignee_name: None,
            project_id: None,
            project_name: None,
            start_date: None,
            due_date: due.map(day),
            created_at: None,
            updated_at: updated.map(day),
            cached_at: None,
            raw: json!(null),
        }
    }

    #[test]
    fn on_time_needs_both_dates() {
        assert_eq!(is_on_time(&record(None, Some(1), Some(2))), Some(true));
        assert_eq!(is_on_time(&record(None, Some(3), Some(2))), Some(false));
        assert_eq!(is_on_time(&record(None, None, Some(2))), None);
        assert_eq!(is_on_time(&record(None, Some(1), None)), None);
    }

    #[test]
    fn closed_matches_both_locales() {
        assert!(is_closed(&record(Some("Closed"), None, None)));
        assert!(is_closed(&record(Some("ดำเนินการเสร็จ"), None, None)));
        assert!(!is_closed(&record(Some("New"), None, None)));
        assert!(!is_closed(&record(None, None, None)));
    }

    #[test]
    fn report_window_defaults_to_trailing_thirty_days() {
        let params: ListParams = serde_json::from_value(json!({})).unwrap();
        let filters = windowed_filters(&params);
        let end = filters.start_date_to.expect("end bound is filled in");
        assert_eq!(filters.start_date_from, Some(end - Duration::days(30)));
    }

    #[test]
    fn report_window_keeps_explicit_bounds() {
        let params: ListParams = serde_json::from_value(json!({
            "start_date_from": "2024-01-01T00:00:00Z",
            "start_date_to": "2024-02-01T00:00:00Z",
        }))
        .unwrap();
        let filters = windowed_filters(&params);
        let day = |d: u32| Utc.with_ymd_and_hms(2024, d, 1, 0, 0, 0).unwrap();
        assert_eq!(filters.start_date_from, Some(day(1)));
        assert_eq!(filters.start_date_to, Some(day(2)));
    }
}
