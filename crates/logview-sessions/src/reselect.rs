use serde::{Deserialize, Serialize};

use crate::types::EventHeader;

/// What the viewer remembers about its selected event across reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousSelection {
    pub line: Option<u64>,
    pub ts: Option<String>,
    pub event: Option<String>,
    pub index: Option<usize>,
}

type Rule = fn(&[EventHeader], &PreviousSelection) -> Option<usize>;

const RULES: [Rule; 3] = [by_line, by_timestamp_and_type, by_index];

/// Find the previously selected event in a freshly loaded list. Returns the
/// position in `headers` of the first rule that matches.
pub fn reselect(headers: &[EventHeader], previous: &PreviousSelection) -> Option<usize> {
    RULES.iter().find_map(|rule| rule(headers, previous))
}

fn by_line(headers: &[EventHeader], previous: &PreviousSelection) -> Option<usize> {
    let line = previous.line?;
    headers.iter().position(|h| h.line == line)
}

fn by_timestamp_and_type(headers: &[EventHeader], previous: &PreviousSelection) -> Option<usize> {
    let ts = previous.ts.as_deref()?;
    let event = previous.event.as_deref()?;
    headers
        .iter()
        .position(|h| h.ts.as_deref() == Some(ts) && h.event.as_deref() == Some(event))
}

fn by_index(headers: &[EventHeader], previous: &PreviousSelection) -> Option<usize> {
    previous.index.filter(|&i| i < headers.len())
}
