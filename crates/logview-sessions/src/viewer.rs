use crate::cache::EventCache;
use crate::filter::{apply_filter, FilterCriteria, FilterResult};
use crate::types::{EventHeader, EventRecord};

/// Identifies one session selection. Responses carrying an older ticket
/// belong to a session the viewer has already left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket(u64);

/// Viewer-side state for the active session: its header list and the cache of
/// fetched records.
///
/// Every completion handler passes the ticket it was started with; anything
/// that does not match the current selection is dropped, so an in-flight
/// read for a previous session can finish but never lands.
#[derive(Debug)]
pub struct ViewerState {
    generation: u64,
    session_id: Option<String>,
    headers: Vec<EventHeader>,
    cache: EventCache,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(EventCache::default())
    }
}

impl ViewerState {
    pub fn new(cache: EventCache) -> Self {
        Self {
            generation: 0,
            session_id: None,
            headers: Vec::new(),
            cache,
        }
    }

    /// Switch to `session_id`. Clears the headers and the whole cache.
    pub fn select_session(&mut self, session_id: &str) -> ViewTicket {
        self.generation += 1;
        self.session_id = Some(session_id.to_string());
        self.headers.clear();
        self.cache.clear();
        ViewTicket(self.generation)
    }

    pub fn active_session(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_current(&self, ticket: ViewTicket) -> bool {
        self.session_id.is_some() && ticket.0 == self.generation
    }

    pub fn headers(&self) -> &[EventHeader] {
        &self.headers
    }

    /// Highest line number held; the watermark to resume a live stream from.
    pub fn last_line(&self) -> u64 {
        self.headers.last().map(|h| h.line).unwrap_or(0)
    }

    /// Replace the header list with a full listing. Returns `false` when the
    /// ticket is stale and nothing changed.
    pub fn load_headers(&mut self, ticket: ViewTicket, headers: Vec<EventHeader>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.headers = headers;
        true
    }

    /// Append a live batch, dropping lines already held. Returns how many
    /// headers were added.
    pub fn merge_new_events(&mut self, ticket: ViewTicket, batch: Vec<EventHeader>) -> usize {
        if !self.is_current(ticket) {
            return 0;
        }
        let mut last = self.last_line();
        let mut added = 0;
        for header in batch {
            if header.line <= last {
                continue;
            }
            last = header.line;
            self.headers.push(header);
            added += 1;
        }
        added
    }

    pub fn cached_record(&self, line: u64) -> Option<&EventRecord> {
        self.cache.get(line)
    }

    pub fn store_record(&mut self, ticket: ViewTicket, record: EventRecord) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.cache.put(record.line, record);
        true
    }

    pub fn cache(&self) -> &EventCache {
        &self.cache
    }

    pub fn visible<'a>(&'a self, criteria: &FilterCriteria) -> FilterResult<'a> {
        apply_filter(&self.headers, criteria)
    }
}
