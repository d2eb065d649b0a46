//! Header recovery from the raw transport header block.
//!
//! When an archive lost the structured sender or delivery time, the raw
//! headers the mail client stored alongside the message usually still have
//! them. Matching is best-effort: the first matching line wins and folded
//! (continuation) lines are not unfolded.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::debug;

use crate::model::address::EmailAddress;
use crate::model::mail::Timestamp;
use crate::rfc2047;

static FROM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^From:\s*(.+?)\s*<(.+?)>").expect("valid regex"));

static DATE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^Date:\s*(.+)").expect("valid regex"));

static MESSAGE_ID_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^Message-ID:[ \t]*(.*)$").expect("valid regex"));

/// Structured fields already read from the source message.
#[derive(Debug, Clone, Default)]
pub struct StructuredFields {
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub delivery_time: Option<Timestamp>,
}

/// Sender, date and Message-ID after filling gaps from the transport headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveredHeaders {
    /// `None` when no sender address is known by any path.
    pub sender: Option<EmailAddress>,
    /// `None` when no timestamp is known; callers substitute the current time.
    pub date: Option<Timestamp>,
    pub message_id: Option<String>,
}

/// Fill missing sender and date from `transport_headers`, and extract the Message-ID.
pub fn recover(fields: StructuredFields, transport_headers: Option<&str>) -> RecoveredHeaders {
    let headers = transport_headers.filter(|h| !h.trim().is_empty());

    let sender = match fields.sender_email {
        Some(email) => Some(EmailAddress::new(
            fields.sender_name.unwrap_or_default(),
            email,
        )),
        None => headers.and_then(recover_sender),
    };

    let date = fields
        .delivery_time
        .or_else(|| headers.and_then(recover_date));

    let message_id = headers.and_then(recover_message_id);

    RecoveredHeaders {
        sender,
        date,
        message_id,
    }
}

/// Match the first `From: name <address>` line.
///
/// A bare `From: address` or `From: <address>` line is not recognized.
pub fn recover_sender(headers: &str) -> Option<EmailAddress> {
    let caps = FROM_LINE.captures(headers)?;
    let name = caps.get(1).map_or("", |m| m.as_str()).trim_matches('"');
    let address = caps.get(2).map_or("", |m| m.as_str()).trim();
    if address.is_empty() {
        return None;
    }
    debug!(address, "Recovered sender from transport headers");
    Some(EmailAddress::new(rfc2047::decode(name), address))
}

/// Match the first `Date:` line and parse it; unparsable dates are absent.
pub fn recover_date(headers: &str) -> Option<Timestamp> {
    let caps = DATE_LINE.captures(headers)?;
    let raw = caps.get(1)?.as_str().trim();
    match parse_rfc2822_date(raw) {
        Some(dt) => Some(Timestamp::Zoned(dt)),
        None => {
            debug!(date = raw, "Could not parse Date from transport headers");
            None
        }
    }
}

/// Take the rest of the first `Message-ID:` line, trimmed.
pub fn recover_message_id(headers: &str) -> Option<String> {
    let caps = MESSAGE_ID_LINE.captures(headers)?;
    let value = caps.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse an RFC 2822 date, tolerating a missing weekday and common named zones.
pub fn parse_rfc2822_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }

    // Comments such as "(PST)" after the offset
    let no_comment = strip_trailing_comment(trimmed);
    let no_dow = strip_day_of_week(no_comment);

    let formats = ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"];
    for candidate in [no_dow.clone(), replace_named_tz(&no_dow)] {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
                return Some(dt);
            }
        }
    }

    mail_parser_date(trimmed)
}

/// Attempt to parse a date using `mail-parser`'s lenient parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok()
}

fn strip_trailing_comment(s: &str) -> &str {
    match s.rfind('(') {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(&format!(" {name}")) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}
