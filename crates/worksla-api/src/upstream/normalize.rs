//! Flattening of upstream hypermedia elements into [`WorkItemRecord`]s.
//!
//! Upstream wraps related resources in a `_links` map of `{title, href}`
//! stubs and is loosely typed throughout, so every accessor here defaults
//! rather than fails: a malformed element must never abort a batch.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use crate::models::WorkItemRecord;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<[^<]+?>").expect("tag pattern is valid"));
static CUSTOM_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^customField\d+$").expect("custom field pattern is valid"));

/// Walk a dotted path of object keys, returning `None` if any hop is
/// missing or not an object.
pub fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn dig_str(value: &Value, path: &[&str]) -> Option<String> {
    dig(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Title of a linked resource (`_links.<name>.title`).
pub fn link_title(element: &Value, name: &str) -> Option<String> {
    dig_str(element, &["_links", name, "title"])
}

/// Numeric id of a linked resource, parsed from the trailing segment of
/// `_links.<name>.href`. Any parse failure yields `None`.
pub fn link_id(element: &Value, name: &str) -> Option<i64> {
    let href = dig_str(element, &["_links", name, "href"])?;
    href.rsplit('/').next()?.parse::<i64>().ok()
}

/// Parse an upstream ISO-8601 timestamp. A trailing `Z` is normalized to
/// `+00:00` first; date-only values land at midnight UTC. Failures are
/// logged at warn level and yield `None`, never an error.
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    let normalized = match raw.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => raw.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    tracing::warn!(value = raw, "failed to parse upstream timestamp");
    None
}

/// Strip tags and unescape the fixed entity set upstream emits. Best-effort
/// sanitizer for display text, not an HTML parser.
pub fn clean_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let stripped = TAG_RE.replace_all(text, "");
    let unescaped = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Items of a collection envelope (`_embedded.elements`).
pub fn embedded_elements(body: &Value) -> Vec<Value> {
    dig(body, &["_embedded", "elements"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Reported collection size of an envelope (`total`).
pub fn envelope_total(body: &Value) -> u64 {
    body.get("total").and_then(Value::as_u64).unwrap_or(0)
}

/// Flatten one upstream element into a cache record. Returns `None` only
/// when the element has no usable id; every other field defaults.
pub fn record_from_element(element: &Value) -> Option<WorkItemRecord> {
    let id = element.get("id").and_then(Value::as_i64)?;
    let parse = |key: &str| {
        element
            .get(key)
            .and_then(Value::as_str)
            .and_then(parse_iso)
    };
    Some(WorkItemRecord {
        id,
        subject: element
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: link_title(element, "status"),
        priority: link_title(element, "priority"),
        kind: link_title(element, "type"),
        assignee_id: link_id(element, "assignee"),
        assignee_name: link_title(element, "assignee"),
        project_id: link_id(element, "project"),
        project_name: link_title(element, "project"),
        start_date: parse("startDate"),
        due_date: parse("dueDate"),
        created_at: parse("createdAt"),
        updated_at: parse("updatedAt"),
        cached_at: None,
        raw: element.clone(),
    })
}

/// Listing descriptions come from the `raw` sub-field; detail descriptions
/// from `html`.
pub enum DescriptionSource {
    Raw,
    Html,
}

pub fn description(element: &Value, source: DescriptionSource) -> String {
    let key = match source {
        DescriptionSource::Raw => "raw",
        DescriptionSource::Html => "html",
    };
    dig_str(element, &["description", key]).unwrap_or_default()
}

pub fn done_ratio(element: &Value) -> i64 {
    element
        .get("percentageDone")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Scalar custom fields found directly on the element body: keys matching
/// `customFieldN` whose value is either a `{raw: ...}` formattable or a
/// plain scalar. Blank values are omitted entirely.
pub fn scalar_custom_fields(element: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(obj) = element.as_object() else {
        return out;
    };
    for (key, value) in obj {
        if !CUSTOM_FIELD_RE.is_match(key) {
            continue;
        }
        let extracted = match value.get("raw") {
            Some(raw) => raw.clone(),
            None => value.clone(),
        };
        if is_blank(&extracted) {
            continue;
        }
        out.insert(key.clone(), extracted);
    }
    out
}

/// `customFieldN` entries under `_links` whose href points at a custom
/// option resource; these need a follow-up fetch to resolve.
pub fn custom_option_links(element: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(links) = element.get("_links").and_then(Value::as_object) else {
        return out;
    };
    for (key, link) in links {
        if !CUSTOM_FIELD_RE.is_match(key) {
            continue;
        }
        if let Some(href) = link.get("href").and_then(Value::as_str) {
            if href.contains("/custom_options/") {
                out.insert(key.clone(), href.to_string());
            }
        }
    }
    out
}

/// Display labels for the custom-field keys upstream is configured with.
/// Thai because that is what the upstream instance reports; treated as
/// configuration data rather than inline logic.
pub const CUSTOM_FIELD_LABELS: &[(&str, &str)] = &[
    ("customField2", "ประเภทงานย่อย Network"),
    ("customField3", "ประเภทงานย่อย Hardware"),
    ("customField5", "สถานที่"),
    ("customField6", "หน่วยงานที่ตั้ง"),
    ("customField7", "ผู้แจ้ง (เบอร์โทร)"),
    ("customField8", "แจ้งโดย"),
    ("customField9", "ความเร่งด่วน"),
    ("customField10", "วันที่เริ่มต้น"),
    ("customField25", "วันที่สิ้นสุด"),
];

pub fn custom_field_label(key: &str) -> Option<&'static str> {
    CUSTOM_FIELD_LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_html_strips_tags_and_entities() {
        assert_eq!(
            clean_html("<p>Hello&nbsp;World &amp; Friends</p>"),
            "Hello World & Friends"
        );
    }

    #[test]
    fn clean_html_collapses_whitespace() {
        assert_eq!(clean_html("a  b\n\n c"), "a b c");
        assert_eq!(clean_html(""), "");
    }

    #[test]
    fn parse_iso_zulu_and_offset_agree() {
        let zulu = parse_iso("2024-03-01T10:30:00Z").unwrap();
        let offset = parse_iso("2024-03-01T10:30:00+00:00").unwrap();
        assert_eq!(zulu, offset);
    }

    #[test]
    fn parse_iso_date_only() {
        let parsed = parse_iso("2024-03-01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_iso_garbage_is_none() {
        assert_eq!(parse_iso("not a date"), None);
        assert_eq!(parse_iso(""), None);
    }

    #[test]
    fn link_id_parses_trailing_segment() {
        let el = json!({"_links": {"assignee": {"href": "/api/v3/users/42", "title": "Jane"}}});
        assert_eq!(link_id(&el, "assignee"), Some(42));
        assert_eq!(link_title(&el, "assignee").as_deref(), Some("Jane"));
    }

    #[test]
    fn link_id_defaults_on_non_numeric_or_missing() {
        let el = json!({"_links": {"assignee": {"href": "/api/v3/users/jane"}}});
        assert_eq!(link_id(&el, "assignee"), None);
        assert_eq!(link_id(&el, "project"), None);
        assert_eq!(link_id(&json!({}), "assignee"), None);
    }

    #[test]
    fn record_requires_id_only() {
        assert!(record_from_element(&json!({"subject": "no id"})).is_none());

        let minimal = record_from_element(&json!({"id": 7})).unwrap();
        assert_eq!(minimal.id, 7);
        assert_eq!(minimal.subject, "");
        assert!(minimal.status.is_none());
        assert!(minimal.due_date.is_none());
    }

    #[test]
    fn record_flattens_links_and_dates() {
        let el = json!({
            "id": 101,
            "subject": "Replace switch",
            "startDate": "2024-02-01",
            "dueDate": "2024-02-20",
            "createdAt": "2024-01-15T08:00:00Z",
            "updatedAt": "2024-02-10T12:00:00Z",
            "_links": {
                "status": {"href": "/api/v3/statuses/1", "title": "In progress"},
                "priority": {"href": "/api/v3/priorities/8", "title": "High"},
                "type": {"href": "/api/v3/types/2", "title": "Task"},
                "assignee": {"href": "/api/v3/users/42", "title": "Jane Doe"},
                "project": {"href": "/api/v3/projects/3", "title": "Infra"}
            }
        });
        let rec = record_from_element(&el).unwrap();
        assert_eq!(rec.subject, "Replace switch");
        assert_eq!(rec.status.as_deref(), Some("In progress"));
        assert_eq!(rec.kind.as_deref(), Some("Task"));
        assert_eq!(rec.assignee_id, Some(42));
        assert_eq!(rec.project_name.as_deref(), Some("Infra"));
        assert!(rec.due_date.is_some());
        assert_eq!(rec.raw, el);
    }

    #[test]
    fn scalar_custom_fields_skip_blanks() {
        let el = json!({
            "customField7": {"raw": "0-1234-5678"},
            "customField8": "somchai",
            "customField9": "",
            "customField10": null,
            "subject": "ignored"
        });
        let fields = scalar_custom_fields(&el);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["customField7"], json!("0-1234-5678"));
        assert_eq!(fields["customField8"], json!("somchai"));
    }

    #[test]
    fn custom_option_links_only_match_option_hrefs() {
        let el = json!({
            "_links": {
                "customField2": {"href": "/api/v3/custom_options/12"},
                "customField5": {"href": "/api/v3/users/3", "title": "not an option"},
                "status": {"href": "/api/v3/custom_options/99"}
            }
        });
        let links = custom_option_links(&el);
        assert_eq!(links.len(), 1);
        assert_eq!(links["customField2"], "/api/v3/custom_options/12");
    }
}
