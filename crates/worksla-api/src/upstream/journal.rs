//! Parsing of upstream journal payloads into structured change timelines.
//!
//! Journal detail lines arrive as pre-rendered HTML sentences, not
//! structured diffs, so we clean the markup first and then try a small set
//! of sentence patterns in order of specificity.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{ActivityEntry, ChangeDetail};
use crate::upstream::normalize::{clean_html, dig, link_id, link_title, parse_iso};

static CHANGED_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?s)(.+?) changed from (.+?) to (.+)$").expect("changed-from pattern is valid")
});
static SET_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)(.+?) set to (.+)$").expect("set-to pattern is valid"));

/// Parse one cleaned detail line into a property/old/new triple. Lines that
/// match no pattern become a property-only detail carrying the whole text.
pub fn parse_detail(text: &str) -> ChangeDetail {
    if let Some(caps) = CHANGED_FROM_RE.captures(text) {
        return ChangeDetail {
            property: caps[1].trim().to_string(),
            old_value: Some(caps[2].trim().to_string()),
            new_value: Some(caps[3].trim().to_string()),
            text: text.to_string(),
        };
    }
    if let Some(caps) = SET_TO_RE.captures(text) {
        return ChangeDetail {
            property: caps[1].trim().to_string(),
            old_value: None,
            new_value: Some(caps[2].trim().to_string()),
            text: text.to_string(),
        };
    }
    ChangeDetail {
        property: text.to_string(),
        old_value: None,
        new_value: None,
        text: text.to_string(),
    }
}

/// Cleaned detail lines of one journal element, blank lines dropped.
pub fn detail_lines(element: &Value) -> Vec<String> {
    element
        .get("details")
        .and_then(Value::as_array)
        .map(|details| {
            details
                .iter()
                .filter_map(|d| {
                    let html = d
                        .get("html")
                        .or_else(|| d.get("raw"))
                        .and_then(Value::as_str)?;
                    let cleaned = clean_html(html);
                    (!cleaned.is_empty()).then_some(cleaned)
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn notes_of(element: &Value) -> String {
    dig(element, &["comment", "html"])
        .or_else(|| dig(element, &["comment", "raw"]))
        .and_then(Value::as_str)
        .map(clean_html)
        .unwrap_or_default()
}

fn created_of(element: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    element
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(parse_iso)
}

/// Resolve the author name of a journal element. Link titles win; the
/// configured override map covers accounts whose title is missing; a journal
/// that still has no name but records an Assignee change borrows the new
/// assignee string as a last structured hint before the caller falls back
/// further.
pub fn resolve_user_name(
    element: &Value,
    details: &[ChangeDetail],
    overrides: &HashMap<i64, String>,
) -> Option<String> {
    if let Some(title) = link_title(element, "user") {
        return Some(title);
    }
    if let Some(user_id) = link_id(element, "user") {
        if let Some(name) = overrides.get(&user_id) {
            return Some(name.clone());
        }
    }
    details
        .iter()
        .find(|d| d.property.eq_ignore_ascii_case("assignee"))
        .and_then(|d| d.new_value.clone())
}

/// Plain activity entries, newest-first, details left as cleaned text.
pub fn activities_from_elements(elements: &[Value]) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = elements
        .iter()
        .map(|el| ActivityEntry {
            id: el.get("id").and_then(Value::as_i64),
            user_id: link_id(el, "user"),
            user_name: link_title(el, "user"),
            notes: notes_of(el),
            created_at: created_of(el),
            version: el.get("version").and_then(Value::as_i64),
            details: detail_lines(el),
        })
        .collect();
    entries.sort_by_key(|e| (e.created_at, e.id));
    entries.reverse();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_detail_changed_from() {
        let d = parse_detail("Status changed from New to In progress");
        assert_eq!(d.property, "Status");
        assert_eq!(d.old_value.as_deref(), Some("New"));
        assert_eq!(d.new_value.as_deref(), Some("In progress"));
    }

    #[test]
    fn parse_detail_set_to() {
        let d = parse_detail("Due date set to 2024-03-01");
        assert_eq!(d.property, "Due date");
        assert_eq!(d.old_value, None);
        assert_eq!(d.new_value.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn parse_detail_fallback_keeps_whole_line() {
        let d = parse_detail("File report.pdf added");
        assert_eq!(d.property, "File report.pdf added");
        assert_eq!(d.old_value, None);
        assert_eq!(d.new_value, None);
        assert_eq!(d.text, "File report.pdf added");
    }

    #[test]
    fn changed_from_wins_over_set_to() {
        // "X set to ..." must not swallow a sentence that also contains
        // "changed from".
        let d = parse_detail("Priority changed from Low to High");
        assert_eq!(d.old_value.as_deref(), Some("Low"));
    }

    #[test]
    fn detail_lines_clean_and_drop_blanks() {
        let el = json!({"details": [
            {"html": "<b>Status</b> changed from New to Closed"},
            {"html": "   "},
            {"raw": "Due date set to 2024-01-01"}
        ]});
        let lines = detail_lines(&el);
        assert_eq!(lines, vec![
            "Status changed from New to Closed".to_string(),
            "Due date set to 2024-01-01".to_string(),
        ]);
    }

    fn overrides(entries: &[(i64, &str)]) -> HashMap<i64, String> {
        entries
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect()
    }

    #[test]
    fn resolve_user_name_prefers_link_title() {
        let el = json!({"_links": {"user": {"href": "/api/v3/users/9", "title": "Jane"}}});
        let named = overrides(&[(9, "Override")]);
        assert_eq!(resolve_user_name(&el, &[], &named).as_deref(), Some("Jane"));
    }

    #[test]
    fn resolve_user_name_uses_override_when_title_missing() {
        let el = json!({"_links": {"user": {"href": "/api/v3/users/9"}}});
        let named = overrides(&[(9, "Support Desk")]);
        assert_eq!(
            resolve_user_name(&el, &[], &named).as_deref(),
            Some("Support Desk")
        );
    }

    #[test]
    fn resolve_user_name_infers_from_assignee_change() {
        let el = json!({"_links": {"user": {"href": "/api/v3/users/9"}}});
        let details = vec![parse_detail("Assignee changed from Bob to Carol")];
        assert_eq!(
            resolve_user_name(&el, &details, &HashMap::new()).as_deref(),
            Some("Carol")
        );
    }

    #[test]
    fn activities_sorted_newest_first() {
        let elements = vec![
            json!({"id": 2, "createdAt": "2024-02-01T00:00:00Z", "comment": {"html": "later"}}),
            json!({"id": 1, "createdAt": "2024-01-01T00:00:00Z", "comment": {"html": "earlier"}}),
        ];
        let activities = activities_from_elements(&elements);
        assert_eq!(activities[0].id, Some(2));
        assert_eq!(activities[0].notes, "later");
        assert_eq!(activities[1].notes, "earlier");
    }
}
