//! The assembled output record: MIME layout, headers and envelope line.

use super::mail::Timestamp;

/// Sender used on the envelope line when the message has no known sender.
pub const DEFAULT_ENVELOPE_SENDER: &str = "MAILER-DAEMON";

/// The four MIME layouts an output record can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeShape {
    /// Single `text/plain` part.
    Plain,
    /// Single `text/html` part.
    Html,
    /// `multipart/alternative` with plain then HTML.
    Alternative,
    /// `multipart/mixed` with a body part followed by attachments.
    Mixed,
}

/// Choose the MIME layout from what the message carries.
pub fn select_shape(has_attachments: bool, has_plain: bool, has_html: bool) -> MimeShape {
    match (has_attachments, has_plain, has_html) {
        (true, _, _) => MimeShape::Mixed,
        (false, true, true) => MimeShape::Alternative,
        (false, false, true) => MimeShape::Html,
        (false, _, false) => MimeShape::Plain,
    }
}

/// A base64-encoded `application/octet-stream` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    pub filename: String,
    pub data: Vec<u8>,
}

/// The MIME tree of an output record.
///
/// The body of a [`MimeLayout::Mixed`] is never itself `Mixed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeLayout {
    Plain(String),
    Html(String),
    Alternative { plain: String, html: String },
    Mixed {
        body: Box<MimeLayout>,
        attachments: Vec<AttachmentPart>,
    },
}

impl MimeLayout {
    pub fn shape(&self) -> MimeShape {
        match self {
            Self::Plain(_) => MimeShape::Plain,
            Self::Html(_) => MimeShape::Html,
            Self::Alternative { .. } => MimeShape::Alternative,
            Self::Mixed { .. } => MimeShape::Mixed,
        }
    }

    /// Attachment parts carried by this layout (empty unless `Mixed`).
    pub fn attachments(&self) -> &[AttachmentPart] {
        match self {
            Self::Mixed { attachments, .. } => attachments,
            _ => &[],
        }
    }
}

/// The `From <sender> <date>` separator line preceding a record in an mbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeLine {
    pub sender: String,
    pub date: Timestamp,
}

impl EnvelopeLine {
    /// Render without the trailing newline.
    pub fn render(&self) -> String {
        format!("From {} {}", self.sender, self.date.to_envelope_date())
    }
}

/// A top-level header. Values are ASCII-only and contain no line breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: &'static str,
    pub value: String,
}

/// One RFC 5322 message ready to be appended to the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub headers: Vec<Header>,
    pub body: MimeLayout,
    /// `None` when no sender address could be recovered.
    pub envelope: Option<EnvelopeLine>,
}

impl OutputRecord {
    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn shape(&self) -> MimeShape {
        self.body.shape()
    }
}
