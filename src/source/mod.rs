//! Source archive abstraction.
//!
//! A source archive yields message records whose fields may be missing or
//! corrupted. Every field read returns [`FieldResult`]: `Ok(None)` for an
//! absent field, `Err` for one that exists but cannot be decoded. Pipeline
//! code never calls these methods directly; it goes through [`field`].

pub mod field;
pub mod json;

use crate::error::{FieldDecodeError, FieldResult, SourceError};
use crate::model::mail::Timestamp;

/// An archive that can be read exactly once, front to back.
pub trait SourceArchive {
    type Message: SourceMessage;
    type Messages: Iterator<Item = Result<Self::Message, SourceError>>;

    /// Consume the archive and iterate its messages in storage order.
    fn into_messages(self) -> Self::Messages;
}

/// Read-only view of one archived message.
pub trait SourceMessage {
    type Attachment: SourceAttachment;
    type Recipient: SourceRecipient;

    fn subject(&self) -> FieldResult<String>;
    fn plain_text_body(&self) -> FieldResult<String>;
    fn html_body(&self) -> FieldResult<String>;
    fn sender_name(&self) -> FieldResult<String>;
    fn sender_email(&self) -> FieldResult<String>;
    fn delivery_time(&self) -> FieldResult<Timestamp>;
    /// Raw RFC 5322 header block as received by the original mail client.
    fn transport_headers(&self) -> FieldResult<String>;
    fn recipients(&self) -> FieldResult<Vec<Self::Recipient>>;
    fn attachment_count(&self) -> FieldResult<usize>;
    /// Fetch the attachment handle at `index` in `0..attachment_count`.
    fn attachment(&self, index: usize) -> Result<Self::Attachment, FieldDecodeError>;
    /// Name of the folder containing the message.
    fn folder_name(&self) -> FieldResult<String>;
}

/// One recipient of a message.
pub trait SourceRecipient {
    fn email_address(&self) -> FieldResult<String>;
    fn name(&self) -> FieldResult<String>;
}

/// One attachment of a message, with several independent ways to read its bytes.
pub trait SourceAttachment {
    fn name(&self) -> FieldResult<String>;
    /// Size recorded in the attachment table.
    fn size(&self) -> FieldResult<u64>;
    /// Read at most `size` bytes from the attachment's sized buffer.
    fn read_buffer(&self, size: u64) -> FieldResult<Vec<u8>>;
    /// Read the whole attachment stream.
    fn bulk_data(&self) -> FieldResult<Vec<u8>>;
    /// Read the raw data property.
    fn data(&self) -> FieldResult<Vec<u8>>;
}
