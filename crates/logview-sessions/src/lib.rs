//! # logview-sessions
//!
//! Session discovery, JSONL event reading and live tailing for logview.
//!
//! ## Key Types
//!
//! - [`SessionScanner`] - cached project/session hierarchy with single-flight rescans
//! - [`EventHeader`] / [`EventRecord`] - lightweight list projection vs full event
//! - [`TailDispatcher`] - pushes newly appended headers to a live subscriber
//! - [`ViewerState`] - viewer-side headers, [`EventCache`] and stale-response guard
//!
//! ## On-disk layout
//!
//! ```text
//! <projects_dir>/<project_slug>/sessions/<session_id>/events.jsonl
//!                                                    /metadata.json
//! ```

pub mod cache;
pub mod error;
pub mod filter;
pub mod preview;
pub mod range;
pub mod reader;
pub mod reselect;
pub mod scanner;
pub mod tail;
pub mod types;
pub mod viewer;
pub mod watcher;

pub use cache::{EventCache, DEFAULT_CACHE_CAPACITY};
pub use error::{EngineError, Result};
pub use filter::{apply_filter, event_type_options, FilterCriteria, FilterResult, TypeGroup};
pub use preview::compute_preview;
pub use range::DateRange;
pub use reader::{count_lines, list_headers, read_headers_from, read_record, LineCursor};
pub use reselect::{reselect, PreviousSelection};
pub use scanner::{
    order_sessions, scan_projects, session_metadata, ScanStats, ScanStatus, SessionHierarchySnapshot,
    SessionOrder, SessionScanner, DEFAULT_FRESHNESS,
};
pub use tail::{Subscription, TailDispatcher, TailRegistry, DEFAULT_POLL_INTERVAL};
pub use types::{
    agent_label, parent_session_id, EventHeader, EventRecord, Project, Session,
    SessionMetadata,
};
pub use viewer::{ViewTicket, ViewerState};
pub use watcher::FileWatcher;
