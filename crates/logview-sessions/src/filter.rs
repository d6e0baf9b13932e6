use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::EventHeader;

/// Criteria for narrowing the event list. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Case-insensitive substring of the event type or preview.
    #[serde(default)]
    pub text: Option<String>,
    /// Exact level.
    #[serde(default)]
    pub level: Option<String>,
    /// Exact event type, or a prefix when it ends with `:`.
    #[serde(default)]
    pub event_type: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        [&self.text, &self.level, &self.event_type]
            .iter()
            .all(|c| c.as_deref().map_or(true, str::is_empty))
    }

    fn matches(&self, header: &EventHeader, needle: Option<&str>) -> bool {
        if let Some(level) = self.level.as_deref().filter(|l| !l.is_empty()) {
            if header.lvl.as_deref() != Some(level) {
                return false;
            }
        }

        if let Some(wanted) = self.event_type.as_deref().filter(|t| !t.is_empty()) {
            let event_type = header.event_type();
            let hit = if wanted.ends_with(':') {
                event_type.starts_with(wanted)
            } else {
                event_type == wanted
            };
            if !hit {
                return false;
            }
        }

        if let Some(needle) = needle {
            if !header.event_type().to_lowercase().contains(needle)
                && !header.preview.to_lowercase().contains(needle)
            {
                return false;
            }
        }

        true
    }
}

/// The visible subsequence of a header list.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult<'a> {
    pub events: Vec<&'a EventHeader>,
    pub filtered: usize,
    pub total: usize,
}

/// Filter headers, preserving their order. Pure: the same inputs always give
/// the same output.
pub fn apply_filter<'a>(headers: &'a [EventHeader], criteria: &FilterCriteria) -> FilterResult<'a> {
    let needle = criteria
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);

    let events: Vec<&EventHeader> = headers
        .iter()
        .filter(|h| criteria.matches(h, needle.as_deref()))
        .collect();

    FilterResult {
        filtered: events.len(),
        total: headers.len(),
        events,
    }
}

/// Event types sharing the text before their first `:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeGroup {
    pub prefix: String,
    /// `"<prefix>:"` filter value, offered only for groups of more than one type.
    pub all_option: Option<String>,
    pub label: Option<String>,
    pub event_types: Vec<String>,
}

/// Derive the event-type filter options from the loaded headers, grouped by
/// prefix and sorted.
pub fn event_type_options(headers: &[EventHeader]) -> Vec<TypeGroup> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for header in headers {
        let Some(event_type) = header.event.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let prefix = event_type.split(':').next().unwrap_or(event_type);
        groups.entry(prefix).or_default().insert(event_type);
    }

    groups
        .into_iter()
        .map(|(prefix, types)| {
            let grouped = types.len() > 1;
            TypeGroup {
                prefix: prefix.to_string(),
                all_option: grouped.then(|| format!("{}:", prefix)),
                label: grouped.then(|| format!("All {} events", prefix)),
                event_types: types.into_iter().map(String::from).collect(),
            }
        })
        .collect()
}
