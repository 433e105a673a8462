//! Work-item listings and detail views.
//!
//! The cached endpoints read only from the local table; the live endpoints
//! call straight through to upstream. Both honor the assignee allowlist
//! unless the caller opts out.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::allowlist::AllowlistFilter;
use crate::error::ApiError;
use crate::models::{ActivityEntry, JournalEntry, WorkItemDetail, WorkItemRecord};
use crate::pagination::Page;
use crate::repo::{WorkItemFilters, WorkItemStats};
use crate::routes::Principal;
use crate::state::AppState;
use crate::sync::SyncOutcome;

const MAX_PAGE_SIZE: u64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/work_items", get(list_cached))
        .route("/work_items/live", get(list_live))
        .route("/work_items/overdue", get(overdue))
        .route("/work_items/due_soon", get(due_soon))
        .route("/work_items/stats", get(stats))
        .route("/work_items/{id}", get(detail))
        .route("/work_items/{id}/journals", get(journals))
        .route("/work_items/{id}/activities", get(activities))
        .route("/sync", post(trigger_sync))
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
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
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(default = "default_true")]
    pub apply_allowlist: bool,
}

impl ListParams {
    pub(crate) fn filters(&self) -> WorkItemFilters {
        WorkItemFilters {
            status: self.status.clone(),
            priority: self.priority.clone(),
            kind: self.kind.clone(),
            assignee_id: self.assignee_id,
            project_id: self.project_id,
            start_date_from: self.start_date_from,
            start_date_to: self.start_date_to,
            due_date_from: self.due_date_from,
            due_date_to: self.due_date_to,
            search: self.search.clone(),
        }
    }

    fn page(&self) -> u64 {
        self.page.max(1)
    }

    fn page_size(&self) -> u64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    fn descending(&self) -> bool {
        self.sort_order.as_deref() != Some("asc")
    }
}

async fn list_cached(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<WorkItemRecord>>, ApiError> {
    let filters = params.filters();
    let allow_ids = if params.apply_allowlist {
        Some(AllowlistFilter::new(state.assignees.active_ids().await?).ids())
    } else {
        None
    };
    let allow_ref = allow_ids.as_deref();

    let page = params.page();
    let page_size = params.page_size();
    let items = state
        .work_items
        .query(
            (page - 1) * page_size,
            page_size,
            &filters,
            params.sort_by.as_deref(),
            params.descending(),
            allow_ref,
        )
        .await?;
    let total = state.work_items.count(&filters, allow_ref).await? as u64;
    Ok(Json(Page::new(items, total, page, page_size)))
}

/// Live listing straight from upstream. With the allowlist applied, the
/// active id set is joined into the upstream assignee filter; an empty
/// active set short-circuits to an empty page rather than an unfiltered
/// query.
async fn list_live(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<WorkItemRecord>>, ApiError> {
    let page = params.page();
    let page_size = params.page_size();

    let mut filters = BTreeMap::new();
    if let Some(status) = &params.status {
        filters.insert("status".to_string(), status.clone());
    }
    if let Some(kind) = &params.kind {
        filters.insert("type".to_string(), kind.clone());
    }
    if let Some(project_id) = params.project_id {
        filters.insert("project".to_string(), project_id.to_string());
    }
    if params.apply_allowlist {
        let allow = AllowlistFilter::new(state.assignees.active_ids().await?);
        if allow.is_empty() {
            return Ok(Json(Page::empty(page, page_size)));
        }
        match params.assignee_id {
            // A caller-requested assignee narrows the active set, it never
            // widens it; asking for a disallowed one yields an empty page.
            Some(assignee_id) if allow.is_allowed(Some(assignee_id)) => {
                filters.insert("assignee".to_string(), assignee_id.to_string());
            }
            Some(_) => return Ok(Json(Page::empty(page, page_size))),
            None => {
                filters.insert("assignee".to_string(), allow.upstream_filter_value());
            }
        }
    } else if let Some(assignee_id) = params.assignee_id {
        filters.insert("assignee".to_string(), assignee_id.to_string());
    }

    let (records, total) = state
        .upstream
        .list_work_items((page - 1) * page_size, page_size, &filters, params.descending())
        .await;
    Ok(Json(Page::new(records, total, page, page_size)))
}

#[derive(Debug, Deserialize)]
pub struct DeadlineParams {
    pub days: Option<i64>,
    pub limit: Option<u64>,
    #[serde(default = "default_true")]
    pub apply_allowlist: bool,
}

impl DeadlineParams {
    async fn allowlist(&self, state: &AppState) -> Result<Option<AllowlistFilter>, ApiError> {
        if !self.apply_allowlist {
            return Ok(None);
        }
        Ok(Some(AllowlistFilter::new(
            state.assignees.active_ids().await?,
        )))
    }
}

async fn overdue(
    State(state): State<AppState>,
    Query(params): Query<DeadlineParams>,
) -> Result<Json<Vec<WorkItemRecord>>, ApiError> {
    let allow = params.allowlist(&state).await?;
    let items = state
        .work_items
        .get_overdue(params.limit.unwrap_or(50))
        .await?;
    Ok(Json(match allow {
        Some(allow) => allow.apply(items),
        None => items,
    }))
}

async fn due_soon(
    State(state): State<AppState>,
    Query(params): Query<DeadlineParams>,
) -> Result<Json<Vec<WorkItemRecord>>, ApiError> {
    let allow = params.allowlist(&state).await?;
    let items = state
        .work_items
        .get_due_soon(params.days.unwrap_or(7), params.limit.unwrap_or(50))
        .await?;
    Ok(Json(match allow {
        Some(allow) => allow.apply(items),
        None => items,
    }))
}

async fn stats(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<WorkItemStats>, ApiError> {
    let allow_ids = if params.apply_allowlist {
        Some(AllowlistFilter::new(state.assignees.active_ids().await?).ids())
    } else {
        None
    };
    let stats = state
        .work_items
        .get_stats(&params.filters(), allow_ids.as_deref())
        .await?;
    Ok(Json(stats))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WorkItemDetail>, ApiError> {
    state
        .upstream
        .get_work_item(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn journals(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<Vec<JournalEntry>> {
    Json(state.upstream.get_work_item_journals(id).await)
}

async fn activities(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<Vec<ActivityEntry>> {
    Json(state.upstream.get_work_item_activities(id).await)
}

/// Run one sync pass synchronously; the response carries the outcome.
async fn trigger_sync(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<SyncOutcome>, ApiError> {
    principal.require_admin()?;
    Ok(Json(state.sync.sync_once().await))
}
