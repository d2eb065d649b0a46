//! Timestamps carried by source messages.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};

/// `Date:` header layout for zoned timestamps (RFC 2822 §3.3).
const HEADER_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Fallback `Date:` layout when no zone is known (ISO 8601).
const FLOATING_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Date layout of the mbox `From ` separator line (`asctime` style).
const ENVELOPE_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// A message timestamp.
///
/// Archives do not always record a zone, so a timestamp is either anchored
/// to a UTC offset or floating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// A point in time with a known UTC offset.
    Zoned(DateTime<FixedOffset>),
    /// A wall-clock time with no zone information.
    Floating(NaiveDateTime),
}

impl Timestamp {
    /// The current local time.
    pub fn now() -> Self {
        Self::Zoned(Local::now().fixed_offset())
    }

    /// Parse an archive timestamp: RFC 3339 (zoned) or `YYYY-MM-DDTHH:MM:SS` (floating).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(Self::Zoned(dt));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(Self::Floating)
    }

    /// Render for the `Date:` header.
    ///
    /// Zoned timestamps use RFC 2822; floating ones cannot carry a zone and
    /// fall back to ISO 8601.
    pub fn to_header_date(&self) -> String {
        match self {
            Self::Zoned(dt) => dt.format(HEADER_DATE_FORMAT).to_string(),
            Self::Floating(ndt) => ndt.format(FLOATING_DATE_FORMAT).to_string(),
        }
    }

    /// Render for the mbox envelope line, e.g. `Thu Jan 04 10:00:00 2024`.
    pub fn to_envelope_date(&self) -> String {
        match self {
            Self::Zoned(dt) => dt.format(ENVELOPE_DATE_FORMAT).to_string(),
            Self::Floating(ndt) => ndt.format(ENVELOPE_DATE_FORMAT).to_string(),
        }
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::Zoned(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zoned() {
        let ts = Timestamp::parse("2024-01-04T10:00:00+01:00").unwrap();
        assert!(matches!(ts, Timestamp::Zoned(_)));
        assert_eq!(ts.to_header_date(), "Thu, 04 Jan 2024 10:00:00 +0100");
    }

    #[test]
    fn test_parse_utc_suffix() {
        let ts = Timestamp::parse("2024-01-04T10:00:00Z").unwrap();
        assert_eq!(ts.to_header_date(), "Thu, 04 Jan 2024 10:00:00 +0000");
    }

    #[test]
    fn test_parse_floating() {
        let ts = Timestamp::parse("2024-01-04T10:00:00").unwrap();
        assert!(matches!(ts, Timestamp::Floating(_)));
        assert_eq!(ts.to_header_date(), "2024-01-04T10:00:00");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Timestamp::parse("yesterday").is_none());
        assert!(Timestamp::parse("").is_none());
    }

    #[test]
    fn test_envelope_date_ignores_zone() {
        let zoned = Timestamp::parse("2024-01-04T10:00:00-05:00").unwrap();
        let floating = Timestamp::parse("2024-01-04T10:00:00").unwrap();
        assert_eq!(zoned.to_envelope_date(), "Thu Jan 04 10:00:00 2024");
        assert_eq!(floating.to_envelope_date(), "Thu Jan 04 10:00:00 2024");
    }
}
