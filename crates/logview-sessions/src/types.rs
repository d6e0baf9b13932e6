use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sessions whose id has more than this many hyphen-delimited segments are
/// sub-agent sessions.
pub const ROOT_ID_SEGMENTS: usize = 5;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const METADATA_FILE: &str = "metadata.json";

/// A project as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    pub path: PathBuf,
    pub session_count: usize,
}

/// One logged run. The parent relation is derived from the id on demand and
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_slug: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub dir: PathBuf,
    #[serde(skip)]
    pub mtime: Option<SystemTime>,
}

impl Session {
    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Id of the session this sub-agent was spawned from. The parent is not
    /// guaranteed to exist on disk.
    pub fn parent_id(&self) -> Option<&str> {
        parent_session_id(&self.id)
    }

    pub fn agent(&self) -> Option<&str> {
        agent_label(&self.id)
    }

    pub fn is_subagent(&self) -> bool {
        self.parent_id().is_some()
    }
}

/// Byte index of the hyphen that ends the root part of a sub-agent id.
fn root_boundary(id: &str) -> Option<usize> {
    id.match_indices('-')
        .nth(ROOT_ID_SEGMENTS - 1)
        .map(|(idx, _)| idx)
}

/// Derive the parent session id: the first five hyphen-delimited segments of
/// a sub-agent id, `None` for root sessions.
pub fn parent_session_id(id: &str) -> Option<&str> {
    root_boundary(id).map(|idx| &id[..idx])
}

/// The agent label of a sub-agent session: everything after the fifth hyphen.
pub fn agent_label(id: &str) -> Option<&str> {
    root_boundary(id).map(|idx| &id[idx + 1..])
}

/// Lightweight projection of one JSONL line, used for listing and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 1-based physical line number; the join key with [`EventRecord`].
    pub line: u64,
    /// Byte offset of the start of the line.
    pub offset: u64,
    pub ts: Option<String>,
    pub lvl: Option<String>,
    pub event: Option<String>,
    /// Byte size of the raw (trimmed) line.
    pub size: usize,
    pub preview: String,
}

impl EventHeader {
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("")
    }
}

/// The full decoded JSON object of one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub line: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EventRecord {
    pub fn event(&self) -> Option<&str> {
        self.fields.get("event").and_then(Value::as_str)
    }

    pub fn data(&self) -> Option<&Value> {
        self.fields.get("data")
    }
}

/// Session details read on demand from `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub parent_session_id: Option<String>,
    pub context: Value,
}
