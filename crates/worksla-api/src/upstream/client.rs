//! Authenticated HTTP client for the upstream work-package API.
//!
//! All reads go through [`UpstreamClient::request`], which applies bounded
//! immediate retries and turns every terminal failure into `None` — callers
//! see "no data", never an error. Successful list and detail responses are
//! held in short-TTL in-process caches to absorb request bursts.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::models::{
    ActivityEntry, ChangeDetail, CustomField, JournalEntry, WorkItemDetail, WorkItemRecord,
};
use crate::repo::SettingsRepo;
use crate::upstream::journal;
use crate::upstream::normalize::{self, DescriptionSource};

const LIST_CACHE_CAPACITY: usize = 256;
const DETAIL_CACHE_CAPACITY: usize = 1024;

/// Connection parameters for the upstream API. The API key is sent
/// pre-encoded in a `Basic` authorization header; when absent the header is
/// omitted entirely.
#[derive(Debug, Clone)]
pub struct UpstreamCredentials {
    pub base_url: String,
    pub api_key: Option<String>,
    pub verify_ssl: bool,
    pub timeout: Duration,
}

impl UpstreamCredentials {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.upstream_base_url.clone(),
            api_key: config.upstream_api_key.clone(),
            verify_ssl: config.upstream_verify_ssl,
            timeout: config.upstream_timeout,
        }
    }
}

struct ClientCore {
    creds: UpstreamCredentials,
    http: reqwest::Client,
    /// Display names for upstream accounts whose profile name is wrong or
    /// gone, keyed by user id. Loaded from settings; survives rotation.
    name_overrides: HashMap<i64, String>,
}

fn build_http(creds: &UpstreamCredentials) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(creds.timeout)
        .danger_accept_invalid_certs(!creds.verify_ssl)
        .build()
}

pub struct UpstreamClient {
    core: RwLock<ClientCore>,
    list_cache: TtlCache<String, (Vec<WorkItemRecord>, u64)>,
    detail_cache: TtlCache<i64, WorkItemDetail>,
    max_retries: u32,
    /// Bumped on every credential swap. A response fetched under an older
    /// generation is never admitted to the caches.
    generation: AtomicU64,
}

impl UpstreamClient {
    pub fn new(
        creds: UpstreamCredentials,
        cache_ttl: Duration,
        max_retries: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = build_http(&creds)?;
        Ok(Self {
            core: RwLock::new(ClientCore {
                creds,
                http,
                name_overrides: HashMap::new(),
            }),
            list_cache: TtlCache::new(LIST_CACHE_CAPACITY, cache_ttl),
            detail_cache: TtlCache::new(DETAIL_CACHE_CAPACITY, cache_ttl),
            max_retries,
            generation: AtomicU64::new(0),
        })
    }

    /// Build a client from static configuration, then override each
    /// connection parameter from the settings table where present. Settings
    /// lookups are best-effort: a failure is logged and the static value
    /// stays active.
    pub async fn from_settings(
        config: &Config,
        settings: &SettingsRepo,
    ) -> Result<Self, reqwest::Error> {
        let mut creds = UpstreamCredentials::from_config(config);
        match settings.get_value("openproject.base_url").await {
            Ok(Some(Value::String(url))) if !url.is_empty() => creds.base_url = url,
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "settings lookup failed for base_url"),
        }
        match settings.get_value("openproject.api_key").await {
            Ok(Some(Value::String(key))) if !key.is_empty() => creds.api_key = Some(key),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "settings lookup failed for api_key"),
        }
        match settings.get_value("openproject.timeout").await {
            Ok(Some(value)) => {
                if let Some(secs) = value.as_u64() {
                    creds.timeout = Duration::from_secs(secs);
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "settings lookup failed for timeout"),
        }
        match settings.get_value("openproject.verify_ssl").await {
            Ok(Some(Value::Bool(verify))) => creds.verify_ssl = verify,
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "settings lookup failed for verify_ssl"),
        }
        let client = Self::new(creds, config.response_cache_ttl, 3)?;
        match settings.get_value("openproject.user_name_overrides").await {
            Ok(Some(value)) => client.set_name_overrides(parse_name_overrides(&value)).await,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "settings lookup failed for user_name_overrides");
            }
        }
        Ok(client)
    }

    /// Replace the display-name override map used when resolving journal
    /// authors. Keys are upstream user ids.
    pub async fn set_name_overrides(&self, overrides: HashMap<i64, String>) {
        self.core.write().await.name_overrides = overrides;
    }

    /// Swap live credentials and rebuild the HTTP client. Both response
    /// caches are cleared under the same write lock, so no request issued
    /// after the swap can observe data fetched under the old credentials.
    pub async fn update_credentials(
        &self,
        creds: UpstreamCredentials,
    ) -> Result<(), reqwest::Error> {
        let http = build_http(&creds)?;
        let mut core = self.core.write().await;
        core.creds = creds;
        core.http = http;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.list_cache.clear();
        self.detail_cache.clear();
        Ok(())
    }

    fn same_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    pub async fn credentials(&self) -> UpstreamCredentials {
        self.core.read().await.creds.clone()
    }

    /// One GET against the upstream API. Up to `max_retries` immediate
    /// attempts; a 404 short-circuits to `None`; any other failure is logged
    /// and retried; exhaustion yields `None`.
    async fn request(&self, path: &str, params: &[(&str, String)]) -> Option<Value> {
        let (url, api_key, http) = {
            let core = self.core.read().await;
            (
                format!("{}{}", core.creds.base_url.trim_end_matches('/'), path),
                core.creds.api_key.clone(),
                core.http.clone(),
            )
        };
        for attempt in 1..=self.max_retries {
            let mut req = http.get(&url).query(params);
            if let Some(key) = &api_key {
                req = req.header(reqwest::header::AUTHORIZATION, format!("Basic {key}"));
            }
            match req.send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => return None,
                Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                    Ok(body) => return Some(body),
                    Err(err) => {
                        tracing::warn!(%url, attempt, error = %err, "upstream body decode failed");
                    }
                },
                Ok(resp) => {
                    tracing::warn!(%url, attempt, status = %resp.status(), "upstream non-success");
                }
                Err(err) => {
                    tracing::warn!(%url, attempt, error = %err, "upstream request failed");
                }
            }
        }
        None
    }

    /// List one page of work items. Returns `([], 0)` when upstream is
    /// unavailable; callers must treat that as "no data", not an error.
    pub async fn list_work_items(
        &self,
        offset: u64,
        limit: u64,
        filters: &BTreeMap<String, String>,
        descending: bool,
    ) -> (Vec<WorkItemRecord>, u64) {
        let sort = if descending { "desc" } else { "asc" };
        let filter_json = encode_filters(filters);
        // BTreeMap iteration is key-sorted, so the serialized filter string
        // is stable no matter how callers assembled the map.
        let cache_key = format!("{offset}|{limit}|{sort}|{filter_json}");
        if let Some(hit) = self.list_cache.get(&cache_key) {
            return hit;
        }
        let generation = self.generation.load(Ordering::Acquire);

        let params = [
            ("offset", offset.to_string()),
            ("pageSize", limit.to_string()),
            ("filters", filter_json),
            ("sortBy", json!([["id", sort]]).to_string()),
        ];
        let Some(body) = self.request("/work_packages", &params).await else {
            return (Vec::new(), 0);
        };
        let total = normalize::envelope_total(&body);
        let records: Vec<WorkItemRecord> = normalize::embedded_elements(&body)
            .iter()
            .filter_map(normalize::record_from_element)
            .collect();
        // A rotation may have landed while the response was in flight; data
        // fetched under the old credentials must not outlive the clear. The
        // re-check after the insert closes the window between the first check
        // and the insert itself.
        if self.same_generation(generation) {
            self.list_cache.insert(cache_key, (records.clone(), total));
            if !self.same_generation(generation) {
                self.list_cache.clear();
            }
        }
        (records, total)
    }

    /// Fetch one work item with custom fields resolved. `None` covers both
    /// "does not exist" (404) and "unavailable after retries".
    pub async fn get_work_item(&self, id: i64) -> Option<WorkItemDetail> {
        if let Some(hit) = self.detail_cache.get(&id) {
            return Some(hit);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let body = self.request(&format!("/work_packages/{id}"), &[]).await?;
        let record = normalize::record_from_element(&body)?;
        let description = normalize::description(&body, DescriptionSource::Html);
        let detail = WorkItemDetail {
            description_text: normalize::clean_html(&description),
            description,
            author_name: normalize::link_title(&body, "author"),
            category: normalize::link_title(&body, "category"),
            done_ratio: normalize::done_ratio(&body),
            custom_fields: self.resolve_custom_fields(&body).await,
            record,
        };
        if self.same_generation(generation) {
            self.detail_cache.insert(id, detail.clone());
            if !self.same_generation(generation) {
                self.detail_cache.clear();
            }
        }
        Some(detail)
    }

    /// Scalar custom fields come straight off the element; option-typed
    /// fields need one follow-up fetch each to resolve display value and id.
    async fn resolve_custom_fields(&self, body: &Value) -> BTreeMap<String, CustomField> {
        let mut fields = BTreeMap::new();
        for (key, value) in normalize::scalar_custom_fields(body) {
            let label = normalize::custom_field_label(&key).map(str::to_string);
            fields.insert(
                key,
                CustomField {
                    value: Some(value),
                    label,
                    option_value: None,
                    option_id: None,
                },
            );
        }
        for (key, href) in normalize::custom_option_links(body) {
            let Some(option_id) = href.rsplit('/').next().and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            let Some(option) = self.request(&format!("/custom_options/{option_id}"), &[]).await
            else {
                continue;
            };
            let option_value = option
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string);
            if option_value.is_none() {
                continue;
            }
            let label = normalize::custom_field_label(&key).map(str::to_string);
            fields.insert(
                key,
                CustomField {
                    value: option_value.clone().map(Value::String),
                    label,
                    option_value,
                    option_id: Some(option_id),
                },
            );
        }
        fields
    }

    async fn fetch_user_name(&self, user_id: i64) -> Option<String> {
        let body = self.request(&format!("/users/{user_id}"), &[]).await?;
        body.get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Structured change history for one work item, oldest-first. Author
    /// names resolve through link title, the configured override map, an
    /// Assignee-change inference, a live user fetch, and finally the literal
    /// "deleted user" placeholder.
    pub async fn get_work_item_journals(&self, id: i64) -> Vec<JournalEntry> {
        let Some(body) = self
            .request(&format!("/work_packages/{id}/activities"), &[])
            .await
        else {
            return Vec::new();
        };
        let overrides = self.core.read().await.name_overrides.clone();
        let elements = normalize::embedded_elements(&body);
        let mut entries = Vec::with_capacity(elements.len());
        for el in &elements {
            let details: Vec<ChangeDetail> = journal::detail_lines(el)
                .iter()
                .map(|line| journal::parse_detail(line))
                .collect();
            let user_id = normalize::link_id(el, "user");
            let user_name = match journal::resolve_user_name(el, &details, &overrides) {
                Some(name) => name,
                None => match user_id {
                    Some(uid) => self
                        .fetch_user_name(uid)
                        .await
                        .unwrap_or_else(|| "deleted user".to_string()),
                    None => "deleted user".to_string(),
                },
            };
            entries.push(JournalEntry {
                id: el.get("id").and_then(Value::as_i64),
                user_id,
                user_name,
                notes: journal::notes_of(el),
                created_at: el
                    .get("createdAt")
                    .and_then(Value::as_str)
                    .and_then(normalize::parse_iso),
                version: el.get("version").and_then(Value::as_i64),
                details,
            });
        }
        entries.sort_by_key(|e| (e.created_at, e.id));
        entries
    }

    /// Plain activity history, newest-first. Deliberately the opposite
    /// default order from [`Self::get_work_item_journals`].
    pub async fn get_work_item_activities(&self, id: i64) -> Vec<ActivityEntry> {
        let Some(body) = self
            .request(&format!("/work_packages/{id}/activities"), &[])
            .await
        else {
            return Vec::new();
        };
        journal::activities_from_elements(&normalize::embedded_elements(&body))
    }

    /// Distinct `(user id, display name)` pairs observed across live work
    /// items, for seeding the assignee allowlist.
    pub async fn discover_assignees(&self, page_size: u64, budget: u64) -> Vec<(i64, String)> {
        let mut seen: BTreeMap<i64, String> = BTreeMap::new();
        let mut offset = 0u64;
        while offset < budget {
            let (records, _) = self
                .list_work_items(offset, page_size, &BTreeMap::new(), true)
                .await;
            if records.is_empty() {
                break;
            }
            for rec in &records {
                if let (Some(id), Some(name)) = (rec.assignee_id, rec.assignee_name.clone()) {
                    seen.entry(id).or_insert(name);
                }
            }
            offset += page_size;
        }
        seen.into_iter().collect()
    }
}

/// Parse the `openproject.user_name_overrides` setting: a JSON object whose
/// keys are upstream user ids and whose values are display names. Malformed
/// entries are skipped.
fn parse_name_overrides(value: &Value) -> HashMap<i64, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, name)| {
                    Some((key.parse::<i64>().ok()?, name.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

const FILTERABLE_KEYS: &[&str] = &["status", "assignee", "project", "type"];

/// Encode supported filters as the upstream JSON filter array. Unsupported
/// keys are silently dropped; comma-separated values become value lists.
fn encode_filters(filters: &BTreeMap<String, String>) -> String {
    let parts: Vec<Value> = filters
        .iter()
        .filter(|(key, _)| FILTERABLE_KEYS.contains(&key.as_str()))
        .filter_map(|(key, raw)| {
            let values: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                return None;
            }
            Some(json!({key.as_str(): {"operator": "=", "values": values}}))
        })
        .collect();
    Value::Array(parts).to_string()
}
