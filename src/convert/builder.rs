//! Record builder: turns one source message into an [`OutputRecord`].

use std::borrow::Cow;

use tracing::{debug, warn};

use super::attachment;
use super::header::{self, StructuredFields};
use crate::error::MessageConversionError;
use crate::model::address::format_address;
use crate::model::attachment::{AttachmentRef, AttachmentTally};
use crate::model::mail::Timestamp;
use crate::model::record::{
    select_shape, AttachmentPart, EnvelopeLine, Header, MimeLayout, MimeShape, OutputRecord,
};
use crate::rfc2047;
use crate::source::field::{read_field, read_optional, read_text};
use crate::source::{SourceMessage, SourceRecipient};

/// Subject used when the message has none.
pub const DEFAULT_NO_SUBJECT: &str = "(No Subject)";

/// Body used when the message has neither a plain nor an HTML body.
pub const DEFAULT_NO_CONTENT: &str = "(No content)";

/// Placeholder texts used when fields are missing.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub no_subject: String,
    pub no_content: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            no_subject: DEFAULT_NO_SUBJECT.to_string(),
            no_content: DEFAULT_NO_CONTENT.to_string(),
        }
    }
}

/// Builds output records from source messages.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    options: BuildOptions,
    clock: fn() -> Timestamp,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

impl RecordBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            clock: Timestamp::now,
        }
    }

    /// Replace the source of "now" used when a message has no date.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    /// Convert `message`, filed under `folder`.
    ///
    /// Attachment counters are written into `tally` whether or not the
    /// conversion succeeds. Line breaks in free text are collapsed; the
    /// message fails only when an address or Message-ID carries one.
    pub fn build<M: SourceMessage>(
        &self,
        message: &M,
        folder: &str,
        tally: &mut AttachmentTally,
    ) -> Result<OutputRecord, MessageConversionError> {
        let plain = read_field("plain_text_body", || message.plain_text_body(), String::new());
        let html = read_field("html_body", || message.html_body(), String::new());

        let attachments = attachment::extract(message, tally);
        let body = self.compose_body(plain, html, attachments);

        let subject = read_text("subject", || message.subject())
            .unwrap_or_else(|| self.options.no_subject.clone());

        let transport_headers = read_optional("transport_headers", || message.transport_headers());
        let recovered = header::recover(
            StructuredFields {
                sender_name: read_text("sender_name", || message.sender_name()),
                sender_email: read_text("sender_email_address", || message.sender_email()),
                delivery_time: read_optional("delivery_time", || message.delivery_time()),
            },
            transport_headers.as_deref(),
        );
        let date = recovered.date.unwrap_or_else(self.clock);

        let mut headers = HeaderSet::default();
        headers.push_text("Subject", &single_line(&subject))?;

        let sender = match recovered.sender {
            Some(sender) if usable_token("From", &sender.address)? => Some(sender),
            _ => None,
        };
        let envelope = match &sender {
            Some(sender) => {
                let name = single_line(&sender.display_name);
                headers.push_raw("From", format_address(&sender.address, &name))?;
                Some(EnvelopeLine {
                    sender: sender.address.clone(),
                    date,
                })
            }
            None => {
                debug!("No usable sender address, omitting From header");
                None
            }
        };

        let to = format_recipients(message)?;
        if !to.is_empty() {
            headers.push_raw("To", to)?;
        }

        headers.push_raw("Date", date.to_header_date())?;
        if let Some(message_id) = recovered.message_id {
            if usable_token("Message-ID", &message_id)? {
                headers.push_raw("Message-ID", message_id)?;
            }
        }
        if !folder.is_empty() {
            headers.push_text("X-Folder", &single_line(folder))?;
        }

        Ok(OutputRecord {
            headers: headers.0,
            body,
            envelope,
        })
    }

    /// Pick the MIME layout for the bodies and recovered attachments.
    fn compose_body(&self, plain: String, html: String, attachments: Vec<AttachmentRef>) -> MimeLayout {
        let has_plain = !plain.is_empty();
        let has_html = !html.is_empty();

        match select_shape(!attachments.is_empty(), has_plain, has_html) {
            MimeShape::Mixed => {
                let inner = match select_shape(false, has_plain, has_html) {
                    MimeShape::Alternative => MimeLayout::Alternative { plain, html },
                    MimeShape::Html => MimeLayout::Html(html),
                    _ => MimeLayout::Plain(self.or_placeholder(plain)),
                };
                let parts = attachments
                    .into_iter()
                    .filter(AttachmentRef::has_data)
                    .filter_map(|att| {
                        let filename = att.filename;
                        att.data.map(|data| AttachmentPart { filename, data })
                    })
                    .collect();
                MimeLayout::Mixed {
                    body: Box::new(inner),
                    attachments: parts,
                }
            }
            MimeShape::Alternative => MimeLayout::Alternative { plain, html },
            MimeShape::Html => MimeLayout::Html(html),
            MimeShape::Plain => MimeLayout::Plain(self.or_placeholder(plain)),
        }
    }

    fn or_placeholder(&self, text: String) -> String {
        if text.is_empty() {
            self.options.no_content.clone()
        } else {
            text
        }
    }
}

/// Comma-joined `To:` value; recipients without a usable address are skipped.
fn format_recipients<M: SourceMessage>(message: &M) -> Result<String, MessageConversionError> {
    let mut formatted = Vec::new();
    for recipient in read_field("recipients", || message.recipients(), Vec::new()) {
        let Some(email) = read_text("recipient.email_address", || recipient.email_address())
        else {
            continue;
        };
        if !usable_token("To", &email)? {
            continue;
        }
        let name = read_text("recipient.name", || recipient.name()).unwrap_or_default();
        let rendered = format_address(&email, &single_line(&name));
        if !rendered.is_empty() {
            formatted.push(rendered);
        }
    }
    Ok(formatted.join(", "))
}

/// Collapse line breaks in free text into single spaces.
fn single_line(text: &str) -> Cow<'_, str> {
    if !text.contains(['\r', '\n']) {
        return Cow::Borrowed(text);
    }
    let joined = text
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Cow::Owned(joined)
}

/// Check an address or Message-ID, which cannot be re-encoded.
///
/// A line break fails the message; non-ASCII text drops the value.
fn usable_token(header: &'static str, value: &str) -> Result<bool, MessageConversionError> {
    if value.contains(['\r', '\n']) {
        return Err(MessageConversionError::HeaderInjection {
            name: header.to_string(),
        });
    }
    if !value.is_ascii() {
        warn!(header, value, "Dropping non-ASCII header value");
        return Ok(false);
    }
    Ok(true)
}

/// Ordered headers, rejecting values that would break the record structure.
#[derive(Default)]
struct HeaderSet(Vec<Header>);

impl HeaderSet {
    /// Add a value that is already ASCII-safe.
    fn push_raw(&mut self, name: &'static str, value: String) -> Result<(), MessageConversionError> {
        if value.contains(['\r', '\n']) {
            return Err(MessageConversionError::HeaderInjection {
                name: name.to_string(),
            });
        }
        if !value.is_ascii() {
            return Err(MessageConversionError::NonAsciiHeader {
                name: name.to_string(),
            });
        }
        self.0.push(Header { name, value });
        Ok(())
    }

    /// Add free text, encoding it when it is not ASCII.
    fn push_text(&mut self, name: &'static str, text: &str) -> Result<(), MessageConversionError> {
        self.push_raw(name, rfc2047::encode_if_needed(text).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::json::JsonMessage;
    use serde_json::{json, Value};

    fn message(value: Value) -> JsonMessage {
        match value {
            Value::Object(fields) => JsonMessage::from_fields(fields),
            _ => panic!("test record must be an object"),
        }
    }

    fn fixed_clock() -> Timestamp {
        Timestamp::parse("2030-06-15T12:00:00Z").unwrap()
    }

    fn build(value: Value) -> OutputRecord {
        let mut tally = AttachmentTally::default();
        RecordBuilder::default()
            .with_clock(fixed_clock)
            .build(&message(value), "Inbox", &mut tally)
            .unwrap()
    }

    #[test]
    fn test_plain_and_html_make_alternative() {
        let record = build(json!({ "plain_text_body": "hi", "html_body": "<p>hi</p>" }));
        assert_eq!(
            record.body,
            MimeLayout::Alternative {
                plain: "hi".to_string(),
                html: "<p>hi</p>".to_string()
            }
        );
    }

    #[test]
    fn test_html_only() {
        let record = build(json!({ "html_body": "<p>hi</p>" }));
        assert_eq!(record.shape(), MimeShape::Html);
    }

    #[test]
    fn test_empty_bodies_get_placeholder() {
        let record = build(json!({}));
        assert_eq!(record.body, MimeLayout::Plain("(No content)".to_string()));
        assert!(record.body.attachments().is_empty());
        assert_eq!(record.header("Subject"), Some("(No Subject)"));
    }

    #[test]
    fn test_corrupted_body_counts_as_empty() {
        let record = build(json!({
            "plain_text_body": { "encoding": "utf-8", "base64": "/w==" },
            "html_body": "<b>ok</b>"
        }));
        assert_eq!(record.body, MimeLayout::Html("<b>ok</b>".to_string()));
    }

    #[test]
    fn test_attachments_make_mixed() {
        let record = build(json!({
            "plain_text_body": "see attached",
            "html_body": "<p>see attached</p>",
            "attachments": [
                { "name": "a.txt", "data": "YQ==" },
                { "name": "lost.bin", "size": 99, "buffer": "" },
                { "name": "b.txt", "stream": "Yg==" }
            ]
        }));
        let MimeLayout::Mixed { body, attachments } = &record.body else {
            panic!("expected mixed, got {:?}", record.shape());
        };
        assert_eq!(body.shape(), MimeShape::Alternative);
        let names: Vec<&str> = attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_mixed_with_no_body_uses_placeholder() {
        let record = build(json!({ "attachments": [{ "name": "a.txt", "data": "YQ==" }] }));
        let MimeLayout::Mixed { body, .. } = &record.body else {
            panic!("expected mixed");
        };
        assert_eq!(**body, MimeLayout::Plain("(No content)".to_string()));
    }

    #[test]
    fn test_mixed_even_when_no_attachment_has_data() {
        let record = build(json!({
            "plain_text_body": "x",
            "attachments": [{ "name": "lost.bin", "size": 10 }]
        }));
        assert_eq!(record.shape(), MimeShape::Mixed);
        assert!(record.body.attachments().is_empty());
    }

    #[test]
    fn test_headers_from_structured_fields() {
        let record = build(json!({
            "subject": "Quarterly report",
            "sender_name": "Jane Doe",
            "sender_email_address": "jane@example.com",
            "delivery_time": "2024-01-04T10:00:00+01:00",
            "recipients": [
                { "name": "Bob", "email_address": "bob@example.com" },
                { "name": "No Address" },
                { "email_address": "carol@example.com" }
            ]
        }));
        assert_eq!(record.header("Subject"), Some("Quarterly report"));
        assert_eq!(record.header("From"), Some("Jane Doe <jane@example.com>"));
        assert_eq!(
            record.header("To"),
            Some("Bob <bob@example.com>, carol@example.com")
        );
        assert_eq!(record.header("Date"), Some("Thu, 04 Jan 2024 10:00:00 +0100"));
        assert_eq!(record.header("X-Folder"), Some("Inbox"));
        assert_eq!(record.header("Message-ID"), None);
        assert_eq!(
            record.envelope.as_ref().map(EnvelopeLine::render).as_deref(),
            Some("From jane@example.com Thu Jan 04 10:00:00 2024")
        );
    }

    #[test]
    fn test_headers_recovered_from_transport_headers() {
        let record = build(json!({
            "transport_headers": "From: Jane Doe <jane@example.com>\r\nDate: Fri, 05 Jan 2024 08:30:00 +0000\r\nMessage-ID: <id-1@example.com>\r\n"
        }));
        assert_eq!(record.header("From"), Some("Jane Doe <jane@example.com>"));
        assert_eq!(record.header("Date"), Some("Fri, 05 Jan 2024 08:30:00 +0000"));
        assert_eq!(record.header("Message-ID"), Some("<id-1@example.com>"));
    }

    #[test]
    fn test_no_sender_omits_from_and_envelope() {
        let record = build(json!({ "sender_name": "Nobody" }));
        assert_eq!(record.header("From"), None);
        assert!(record.envelope.is_none());
        assert_eq!(record.header("Date"), Some("Sat, 15 Jun 2030 12:00:00 +0000"));
    }

    #[test]
    fn test_floating_delivery_time_uses_iso_date() {
        let record = build(json!({
            "sender_email_address": "a@b.com",
            "delivery_time": "2024-01-04T10:00:00"
        }));
        assert_eq!(record.header("Date"), Some("2024-01-04T10:00:00"));
    }

    #[test]
    fn test_non_ascii_headers_are_encoded() {
        let record = build(json!({
            "subject": "Café con leña",
            "sender_name": "José García",
            "sender_email_address": "jose@example.com"
        }));
        for header in &record.headers {
            assert!(header.value.is_ascii(), "{} is not ASCII", header.name);
        }
        assert_eq!(
            rfc2047::decode(record.header("Subject").unwrap()),
            "Café con leña"
        );
    }

    #[test]
    fn test_empty_folder_omits_x_folder() {
        let mut tally = AttachmentTally::default();
        let record = RecordBuilder::default()
            .build(&message(json!({})), "", &mut tally)
            .unwrap();
        assert_eq!(record.header("X-Folder"), None);
    }

    #[test]
    fn test_line_breaks_in_free_text_are_collapsed() {
        let mut tally = AttachmentTally::default();
        let record = RecordBuilder::default()
            .with_clock(fixed_clock)
            .build(
                &message(json!({
                    "subject": "line one\r\nBcc: victim@example.com",
                    "sender_name": "Jane\nDoe",
                    "sender_email_address": "jane@example.com",
                    "recipients": [{ "name": "Bob\r\nSmith", "email_address": "bob@example.com" }]
                })),
                "Inbox\nArchive",
                &mut tally,
            )
            .unwrap();
        assert_eq!(
            record.header("Subject"),
            Some("line one Bcc: victim@example.com")
        );
        assert_eq!(record.header("From"), Some("Jane Doe <jane@example.com>"));
        assert_eq!(record.header("To"), Some("Bob Smith <bob@example.com>"));
        assert_eq!(record.header("X-Folder"), Some("Inbox Archive"));
        assert_eq!(record.header("Bcc"), None);
    }

    #[test]
    fn test_line_break_in_address_fails_message() {
        let mut tally = AttachmentTally::default();
        let result = RecordBuilder::default().build(
            &message(json!({
                "sender_email_address": "a@example.com\nBcc: victim@example.com",
                "attachments": [{ "name": "a", "data": "YQ==" }]
            })),
            "Inbox",
            &mut tally,
        );
        assert!(matches!(
            result,
            Err(MessageConversionError::HeaderInjection { ref name }) if name == "From"
        ));
        // Attachments were still enumerated before the failure
        assert_eq!(tally.found, 1);
    }

    #[test]
    fn test_non_ascii_addresses_and_message_id_are_dropped() {
        let record = build(json!({
            "sender_name": "José",
            "sender_email_address": "josé@ejemplo.es",
            "recipients": [
                { "name": "Ana", "email_address": "añа@x.es" },
                { "name": "Bob", "email_address": "bob@example.com" }
            ],
            "transport_headers": "Message-ID: <ñ@x>\r\n"
        }));
        for header in &record.headers {
            assert!(header.value.is_ascii(), "{} is not ASCII", header.name);
        }
        assert_eq!(record.header("From"), None);
        assert!(record.envelope.is_none());
        assert_eq!(record.header("To"), Some("Bob <bob@example.com>"));
        assert_eq!(record.header("Message-ID"), None);
    }

    #[test]
    fn test_header_set_rejects_raw_non_ascii() {
        let mut headers = HeaderSet::default();
        assert!(matches!(
            headers.push_raw("To", "añа@x.es".to_string()),
            Err(MessageConversionError::NonAsciiHeader { ref name }) if name == "To"
        ));
        headers.push_text("Subject", "Café").unwrap();
        assert_eq!(headers.0[0].value, "=?utf-8?b?Q2Fmw6k=?=");
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("plain"), "plain");
        assert_eq!(single_line("a\r\n\r\nb\rc\n"), "a b c");
    }

    #[test]
    fn test_custom_placeholders() {
        let builder = RecordBuilder::new(BuildOptions {
            no_subject: "[none]".to_string(),
            no_content: "[empty]".to_string(),
        });
        let mut tally = AttachmentTally::default();
        let record = builder.build(&message(json!({})), "Inbox", &mut tally).unwrap();
        assert_eq!(record.header("Subject"), Some("[none]"));
        assert_eq!(record.body, MimeLayout::Plain("[empty]".to_string()));
    }
}
