//! HTTP surface tests: a real server on an ephemeral port, driven over
//! the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use worksla_api::config::Config;
use worksla_api::db::create_memory_pool;
use worksla_api::models::WorkItemRecord;
use worksla_api::repo::{AssigneeRepo, SettingsRepo, WorkItemRepo};
use worksla_api::routes;
use worksla_api::state::AppState;
use worksla_api::sync::SyncEngine;
use worksla_api::upstream::{UpstreamClient, UpstreamCredentials};

struct TestApp {
    addr: SocketAddr,
    work_items: WorkItemRepo,
    assignees: AssigneeRepo,
    http: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{path}", self.addr)
    }
}

async fn spawn_app() -> TestApp {
    let pool = create_memory_pool().await.unwrap();
    let work_items = WorkItemRepo::new(pool.clone());
    let assignees = AssigneeRepo::new(pool.clone());
    let settings = SettingsRepo::new(pool);

    // points at a closed port so accidental upstream calls fail fast
    let upstream = Arc::new(
        UpstreamClient::new(
            UpstreamCredentials {
                base_url: "http://127.0.0.1:1".to_string(),
                api_key: None,
                verify_ssl: true,
                timeout: Duration::from_secs(1),
            },
            Duration::from_secs(60),
            1,
        )
        .unwrap(),
    );
    let sync = Arc::new(SyncEngine::new(upstream.clone(), work_items.clone(), 1000, 200));

    let state = AppState {
        config: Arc::new(Config::from_env().unwrap()),
        work_items: work_items.clone(),
        assignees: assignees.clone(),
        settings,
        upstream,
        sync,
    };
    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        work_items,
        assignees,
        http: reqwest::Client::new(),
    }
}

fn record(id: i64, assignee: Option<(i64, &str)>) -> WorkItemRecord {
    WorkItemRecord {
        id,
        subject: format!("Item {id}"),
        status: Some("New".to_string()),
        priority: Some("Normal".to_string()),
        kind: Some("Task".to_string()),
        assignee_id: assignee.map(|(uid, _)| uid),
        assignee_name: assignee.map(|(_, name)| name.to_string()),
        project_id: None,
        project_name: None,
        // inside the default reporting window
        start_date: Some(Utc::now() - chrono::Duration::days(1)),
        due_date: None,
        created_at: None,
        updated_at: Some(Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap()),
        cached_at: None,
        raw: json!({"id": id}),
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;
    let body: Value = app
        .http
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn cached_listing_paginates_and_applies_allowlist() {
    let app = spawn_app().await;
    app.assignees.create(7, "Somchai", true).await.unwrap();
    for rec in [
        record(1, Some((7, "Somchai"))),
        record(2, Some((9, "Jane"))),
        record(3, None),
        record(4, Some((7, "Somchai"))),
    ] {
        app.work_items.upsert(&rec).await.unwrap();
    }

    // assignee 9 is not active: 3 of 4 rows remain
    let body: Value = app
        .http
        .get(app.url("/work_items?page=1&page_size=2&sort_by=id&sort_order=asc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["has_next"], true);
    assert_eq!(body["has_prev"], false);
    let ids: Vec<i64> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    // opting out of the allowlist exposes all rows
    let body: Value = app
        .http
        .get(app.url("/work_items?apply_allowlist=false"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 4);
}

#[tokio::test]
async fn live_listing_with_empty_allowlist_is_empty() {
    let app = spawn_app().await;
    // one entry, but inactive: the active set is empty
    app.assignees.create(7, "Somchai", false).await.unwrap();

    let body: Value = app
        .http
        .get(app.url("/work_items/live"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 0);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let app = spawn_app().await;

    let resp = app.http.get(app.url("/admin/settings")).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .http
        .get(app.url("/admin/settings"))
        .header("x-auth-role", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn admin_assignee_crud_over_http() {
    let app = spawn_app().await;

    let created: Value = app
        .http
        .post(app.url("/admin/assignees"))
        .header("x-auth-role", "admin")
        .json(&json!({"upstream_user_id": 7, "display_name": "Somchai", "active": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["active"], true);

    let updated: Value = app
        .http
        .put(app.url(&format!("/admin/assignees/{id}")))
        .header("x-auth-role", "admin")
        .json(&json!({"active": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["active"], false);

    let resp = app
        .http
        .delete(app.url(&format!("/admin/assignees/{id}")))
        .header("x-auth-role", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn unreachable_upstream_detail_is_404() {
    let app = spawn_app().await;
    let resp = app.http.get(app.url("/work_items/12")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn sla_report_classifies_on_time_and_overdue() {
    let app = spawn_app().await;
    let mut on_time = record(1, None);
    on_time.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    on_time.due_date = Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
    let mut late = record(2, None);
    late.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap());
    late.due_date = Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
    late.status = Some("Closed".to_string());
    let unclassified = record(3, None);
    for rec in [&on_time, &late, &unclassified] {
        app.work_items.upsert(rec).await.unwrap();
    }

    let body: Value = app
        .http
        .get(app.url("/reports/sla"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 3);
    assert_eq!(body["on_time"], 1);
    assert_eq!(body["overdue"], 1);
    assert_eq!(body["closed"], 1);
    // denominator is the full total, unclassified items included
    assert_eq!(body["sla_percentage"], 33.33);
}

#[tokio::test]
async fn sla_report_honors_the_allowlist() {
    let app = spawn_app().await;
    app.assignees.create(7, "Somchai", true).await.unwrap();
    for rec in [record(1, Some((7, "Somchai"))), record(2, Some((9, "Jane")))] {
        app.work_items.upsert(&rec).await.unwrap();
    }

    let body: Value = app
        .http
        .get(app.url("/reports/sla"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);

    let body: Value = app
        .http
        .get(app.url("/reports/sla?apply_allowlist=false"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn sla_report_defaults_to_a_thirty_day_window() {
    let app = spawn_app().await;
    let recent = record(1, None);
    let mut stale = record(2, None);
    stale.start_date = Some(Utc::now() - chrono::Duration::days(90));
    for rec in [&recent, &stale] {
        app.work_items.upsert(rec).await.unwrap();
    }

    let body: Value = app
        .http
        .get(app.url("/reports/sla"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);

    // an explicit start bound widens the window to cover the stale item
    let from = (Utc::now() - chrono::Duration::days(120))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    let body: Value = app
        .http
        .get(app.url(&format!("/reports/sla?start_date_from={from}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn deadline_views_honor_the_allowlist() {
    let app = spawn_app().await;
    app.assignees.create(7, "Somchai", true).await.unwrap();
    let mut mine = record(1, Some((7, "Somchai")));
    mine.due_date = Some(Utc::now() - chrono::Duration::days(2));
    let mut theirs = record(2, Some((9, "Jane")));
    theirs.due_date = Some(Utc::now() - chrono::Duration::days(1));
    let mut soon = record(3, Some((9, "Jane")));
    soon.due_date = Some(Utc::now() + chrono::Duration::days(3));
    for rec in [&mine, &theirs, &soon] {
        app.work_items.upsert(rec).await.unwrap();
    }

    let body: Value = app
        .http
        .get(app.url("/work_items/overdue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1]);

    let body: Value = app
        .http
        .get(app.url("/work_items/due_soon"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.as_array().unwrap().len(), 0);

    let body: Value = app
        .http
        .get(app.url("/work_items/due_soon?apply_allowlist=false"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn stats_honor_the_allowlist() {
    let app = spawn_app().await;
    app.assignees.create(7, "Somchai", true).await.unwrap();
    for rec in [
        record(1, Some((7, "Somchai"))),
        record(2, Some((9, "Jane"))),
        record(3, None),
    ] {
        app.work_items.upsert(&rec).await.unwrap();
    }

    let body: Value = app
        .http
        .get(app.url("/work_items/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["by_status"]["New"], 2);

    let body: Value = app
        .http
        .get(app.url("/work_items/stats?apply_allowlist=false"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn live_listing_rejects_disallowed_assignee_filter() {
    let app = spawn_app().await;
    app.assignees.create(7, "Somchai", true).await.unwrap();

    // 9 is outside the active set: empty page, upstream never consulted
    let body: Value = app
        .http
        .get(app.url("/work_items/live?assignee_id=9"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 0);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}
