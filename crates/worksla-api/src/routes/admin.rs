//! Admin surface: allowlist management, settings, and credential rotation.
//! Every handler requires the admin role.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{AllowlistEntry, Setting};
use crate::routes::Principal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/assignees", get(list_assignees).post(create_assignee))
        .route(
            "/admin/assignees/{id}",
            put(update_assignee).delete(delete_assignee),
        )
        .route("/admin/assignees/discover", post(discover_assignees))
        .route("/admin/settings", get(list_settings))
        .route(
            "/admin/settings/{key}",
            put(upsert_setting).delete(delete_setting),
        )
        .route("/admin/credentials", post(update_credentials))
}

async fn list_assignees(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<AllowlistEntry>>, ApiError> {
    principal.require_admin()?;
    Ok(Json(state.assignees.list().await?))
}

#[derive(Debug, Deserialize)]
struct CreateAssignee {
    upstream_user_id: i64,
    display_name: String,
    #[serde(default)]
    active: bool,
}

async fn create_assignee(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateAssignee>,
) -> Result<(StatusCode, Json<AllowlistEntry>), ApiError> {
    principal.require_admin()?;
    if body.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("display_name must not be empty".to_string()));
    }
    let entry = state
        .assignees
        .create(body.upstream_user_id, body.display_name.trim(), body.active)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
struct UpdateAssignee {
    display_name: Option<String>,
    active: Option<bool>,
}

async fn update_assignee(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAssignee>,
) -> Result<Json<AllowlistEntry>, ApiError> {
    principal.require_admin()?;
    state
        .assignees
        .update(id, body.display_name.as_deref(), body.active)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn delete_assignee(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    principal.require_admin()?;
    if state.assignees.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// Scan live work items for distinct assignees and seed any new ones as
/// inactive entries, leaving activation to an explicit admin toggle.
async fn discover_assignees(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Value>, ApiError> {
    principal.require_admin()?;
    let pairs = state
        .upstream
        .discover_assignees(state.config.sync_page_size, state.config.sync_page_budget)
        .await;
    let inserted = state.assignees.seed_inactive(&pairs).await?;
    Ok(Json(json!({
        "discovered": pairs.len(),
        "inserted": inserted,
    })))
}

async fn list_settings(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Setting>>, ApiError> {
    principal.require_admin()?;
    Ok(Json(state.settings.list().await?))
}

#[derive(Debug, Deserialize)]
struct UpsertSetting {
    value: Value,
    description: Option<String>,
}

async fn upsert_setting(
    State(state): State<AppState>,
    principal: Principal,
    Path(key): Path<String>,
    Json(body): Json<UpsertSetting>,
) -> Result<Json<Setting>, ApiError> {
    principal.require_admin()?;
    let setting = state
        .settings
        .upsert(&key, &body.value, body.description.as_deref())
        .await?;
    Ok(Json(setting))
}

async fn delete_setting(
    State(state): State<AppState>,
    principal: Principal,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    principal.require_admin()?;
    if state.settings.delete(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateCredentials {
    base_url: Option<String>,
    api_key: Option<String>,
    verify_ssl: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CredentialsView {
    base_url: String,
    api_key_set: bool,
    verify_ssl: bool,
    timeout_secs: u64,
}

/// Rotate upstream credentials: merge the submitted fields over the live
/// ones, persist them to the settings table, then swap the client (which
/// clears its response caches). An empty api_key removes the key.
async fn update_credentials(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<UpdateCredentials>,
) -> Result<Json<CredentialsView>, ApiError> {
    principal.require_admin()?;
    let mut creds = state.upstream.credentials().await;
    if let Some(base_url) = body.base_url {
        creds.base_url = base_url;
    }
    if let Some(api_key) = body.api_key {
        creds.api_key = Some(api_key).filter(|k| !k.is_empty());
    }
    if let Some(verify_ssl) = body.verify_ssl {
        creds.verify_ssl = verify_ssl;
    }
    if let Some(secs) = body.timeout_secs {
        creds.timeout = Duration::from_secs(secs);
    }

    state
        .settings
        .upsert("openproject.base_url", &json!(creds.base_url), None)
        .await?;
    state
        .settings
        .upsert(
            "openproject.api_key",
            &json!(creds.api_key.clone().unwrap_or_default()),
            None,
        )
        .await?;
    state
        .settings
        .upsert("openproject.verify_ssl", &json!(creds.verify_ssl), None)
        .await?;
    state
        .settings
        .upsert(
            "openproject.timeout",
            &json!(creds.timeout.as_secs()),
            None,
        )
        .await?;

    let view = CredentialsView {
        base_url: creds.base_url.clone(),
        api_key_set: creds.api_key.is_some(),
        verify_ssl: creds.verify_ssl,
        timeout_secs: creds.timeout.as_secs(),
    };
    state
        .upstream
        .update_credentials(creds)
        .await
        .map_err(|err| ApiError::Internal(format!("failed to rebuild upstream client: {err}")))?;
    Ok(Json(view))
}
