use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Inclusive date range used to narrow project and session listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build a range from `since`/`until` query values. Unparsable bounds are
    /// ignored.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            start: since.and_then(|s| parse_bound(s, now)),
            end: until.and_then(|s| parse_bound(s, now)),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Sessions without a timestamp only match an unbounded range.
    pub fn contains(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(ts) = timestamp else {
            return false;
        };
        if self.start.is_some_and(|start| ts < start) {
            return false;
        }
        if self.end.is_some_and(|end| ts > end) {
            return false;
        }
        true
    }
}

/// Parse either a relative period (`7d`) or an ISO date/datetime.
pub fn parse_bound(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(days) = value.strip_suffix('d') {
        if let Ok(days) = days.parse::<i64>() {
            // Out-of-range periods are ignored like any other bad bound.
            return Duration::try_days(days).and_then(|d| now.checked_sub_signed(d));
        }
    }

    parse_timestamp(value)
}

/// Parse a timestamp as RFC 3339, falling back to naive datetimes and plain
/// dates interpreted as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn huge_relative_period_is_ignored() {
        let now = at("2026-01-20T12:00:00Z");
        assert_eq!(parse_bound("100000000d", now), None);
        assert_eq!(parse_bound(&format!("{}d", i64::MAX), now), None);

        let range = DateRange::parse(Some("100000000d"), None);
        assert!(range.is_unbounded());
    }

    #[test]
    fn relative_days_count_back_from_now() {
        let now = at("2026-01-20T12:00:00Z");
        assert_eq!(parse_bound("2d", now), Some(at("2026-01-18T12:00:00Z")));
    }

    #[test]
    fn accepts_rfc3339_naive_and_date_forms() {
        assert_eq!(
            parse_timestamp("2026-01-20T10:00:00+02:00"),
            Some(at("2026-01-20T08:00:00Z"))
        );
        assert_eq!(
            parse_timestamp("2026-01-20T10:00:00.123456"),
            Some(at("2026-01-20T10:00:00.123456Z"))
        );
        assert_eq!(parse_timestamp("2026-01-20"), Some(at("2026-01-20T00:00:00Z")));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn bounded_range_excludes_missing_timestamps() {
        let range = DateRange {
            start: Some(at("2026-01-01T00:00:00Z")),
            end: None,
        };
        assert!(!range.contains(None));
        assert!(range.contains(Some(at("2026-01-02T00:00:00Z"))));
        assert!(!range.contains(Some(at("2025-12-31T00:00:00Z"))));
        assert!(DateRange::default().contains(None));
    }

    #[test]
    fn garbage_bounds_are_ignored() {
        let range = DateRange::parse(Some("xd"), Some("not-a-date"));
        assert!(range.is_unbounded());
    }
}
