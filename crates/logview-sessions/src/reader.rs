use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::preview::compute_preview;
use crate::types::{EventHeader, EventRecord};

/// Position in a JSONL file: the byte offset of the next unread line and
/// that line's 1-based number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCursor {
    pub offset: u64,
    pub next_line: u64,
}

impl Default for LineCursor {
    fn default() -> Self {
        Self {
            offset: 0,
            next_line: 1,
        }
    }
}

/// Only the fields needed for a header; `data` stays undecoded.
#[derive(Deserialize)]
struct RawHeader<'a> {
    #[serde(default, deserialize_with = "lenient_string")]
    ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    lvl: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    event: Option<String>,
    #[serde(default, borrow)]
    data: Option<&'a RawValue>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// List headers for every well-formed line of a session's event file, in
/// file order. Blank and malformed lines are skipped but still consume a
/// line number.
pub fn list_headers(path: &Path) -> Result<Vec<EventHeader>> {
    let (headers, _) = read_headers_from(path, LineCursor::default(), false)?;
    Ok(headers)
}

/// Read headers starting at `cursor`. With `complete_only`, a trailing line
/// without a newline is left unread so a writer can finish it.
pub fn read_headers_from(
    path: &Path,
    cursor: LineCursor,
    complete_only: bool,
) -> Result<(Vec<EventHeader>, LineCursor)> {
    let file = File::open(path).map_err(|e| EngineError::read(path, e))?;
    let mut reader = BufReader::new(file);
    if cursor.offset > 0 {
        reader
            .seek(SeekFrom::Start(cursor.offset))
            .map_err(|e| EngineError::read(path, e))?;
    }

    let mut cursor = cursor;
    let mut headers = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| EngineError::read(path, e))?;
        if n == 0 {
            break;
        }
        if complete_only && buf.last() != Some(&b'\n') {
            break;
        }

        let line = cursor.next_line;
        let offset = cursor.offset;
        cursor.offset += n as u64;
        cursor.next_line += 1;

        let raw = buf.trim_ascii();
        if raw.is_empty() {
            continue;
        }
        match project_header(raw, line, offset) {
            Ok(header) => headers.push(header),
            Err(e) => tracing::debug!("Skipping malformed line {} in {:?}: {}", line, path, e),
        }
    }

    Ok((headers, cursor))
}

fn project_header(raw: &[u8], line: u64, offset: u64) -> serde_json::Result<EventHeader> {
    // A derived struct would also accept a positional array.
    if raw.first() != Some(&b'{') {
        return Err(serde_json::Error::custom("event line is not a JSON object"));
    }
    let parsed: RawHeader<'_> = serde_json::from_slice(raw)?;
    let event_type = parsed.event.as_deref().unwrap_or("");
    let preview = compute_preview(event_type, parsed.data);

    Ok(EventHeader {
        line,
        offset,
        ts: parsed.ts,
        lvl: parsed.lvl,
        event: parsed.event,
        size: raw.len(),
        preview,
    })
}

/// Fetch the full record for one line. `offset_hint` (a header's `offset`)
/// is used only after confirming it is the start of line `line`; a stale or
/// misaligned hint falls back to scanning line by line. Only the requested
/// line is ever decoded.
pub fn read_record(path: &Path, line: u64, offset_hint: Option<u64>) -> Result<EventRecord> {
    if line == 0 {
        return Err(EngineError::not_found("Line", line));
    }

    let file = File::open(path).map_err(|e| EngineError::read(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    if let Some(offset) = offset_hint {
        if hint_matches(&mut reader, offset, line).map_err(|e| EngineError::read(path, e))? {
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| EngineError::read(path, e))?;
            if n > 0 {
                return decode_record(&buf, line);
            }
        }
        tracing::debug!("Ignoring byte offset hint {} for line {} in {:?}", offset, line, path);
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| EngineError::read(path, e))?;
    }

    let mut current = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| EngineError::read(path, e))?;
        if n == 0 {
            return Err(EngineError::not_found("Line", line));
        }
        current += 1;
        if current == line {
            return decode_record(&buf, line);
        }
    }
}

/// Consume the first `offset` bytes and check that they hold exactly
/// `line - 1` complete lines, leaving the reader at the start of `line`.
fn hint_matches<R: BufRead>(reader: &mut R, offset: u64, line: u64) -> std::io::Result<bool> {
    let mut prefix = reader.by_ref().take(offset);
    let mut newlines = 0u64;
    let mut last = None;
    loop {
        let buf = prefix.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        newlines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        last = buf.last().copied();
        let n = buf.len();
        prefix.consume(n);
    }
    let complete = prefix.limit() == 0 && (offset == 0 || last == Some(b'\n'));
    Ok(complete && newlines == line - 1)
}

fn decode_record(buf: &[u8], line: u64) -> Result<EventRecord> {
    let raw = buf.trim_ascii();
    if raw.is_empty() {
        return Err(EngineError::not_found("Line", line));
    }
    let mut fields: Map<String, Value> =
        serde_json::from_slice(raw).map_err(|source| EngineError::Parse { line, source })?;
    fields.remove("line");
    Ok(EventRecord { line, fields })
}

/// Number of non-empty lines; 0 when the file is missing or unreadable.
pub fn count_lines(path: &Path) -> usize {
    let Ok(file) = File::open(path) else {
        return 0;
    };
    BufReader::new(file)
        .split(b'\n')
        .map_while(|line| line.ok())
        .filter(|line| !line.trim_ascii().is_empty())
        .count()
}
