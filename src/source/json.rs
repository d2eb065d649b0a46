//! JSON Lines message dumps.
//!
//! Each non-blank line holds one message record. Text fields are either
//! JSON strings or raw byte objects `{"encoding": "utf-16le", "base64": "…"}`
//! decoded strictly, so byte-level corruption surfaces as a
//! [`FieldDecodeError`] instead of replacement characters. Binary attachment
//! payloads are base64 strings.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};

use super::{SourceArchive, SourceAttachment, SourceMessage, SourceRecipient};
use crate::error::{
    ConvertError, FieldDecodeError, FieldResult, MessageConversionError, SourceError,
};
use crate::model::mail::Timestamp;

/// Read buffer for the dump file (1 MB, records carry inline attachments).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// A message dump opened for a single sequential pass.
pub struct JsonArchive {
    path: PathBuf,
    reader: BufReader<File>,
    file_size: u64,
}

impl JsonArchive {
    /// Open a dump file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ConvertError::ArchiveOpen {
            path: path.clone(),
            source,
        })?;
        let file_size = file
            .metadata()
            .map_err(|source| ConvertError::ArchiveOpen {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self {
            path,
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            file_size,
        })
    }

    /// Size of the dump file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl SourceArchive for JsonArchive {
    type Message = JsonMessage;
    type Messages = JsonMessages;

    fn into_messages(self) -> JsonMessages {
        JsonMessages {
            path: self.path,
            reader: self.reader,
            line_no: 0,
            exhausted: false,
            line_buf: Vec::with_capacity(64 * 1024),
        }
    }
}

/// Single-pass iterator over the records of a [`JsonArchive`].
///
/// Once the end of file or a read error is reached it only yields `None`.
pub struct JsonMessages {
    path: PathBuf,
    reader: BufReader<File>,
    line_no: u64,
    exhausted: bool,
    line_buf: Vec<u8>,
}

impl JsonMessages {
    /// Whether the iterator has reached its terminal state.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Iterator for JsonMessages {
    type Item = Result<JsonMessage, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            self.line_buf.clear();
            match self.reader.read_until(b'\n', &mut self.line_buf) {
                Ok(0) => self.exhausted = true,
                Ok(_) => {
                    self.line_no += 1;
                    if self.line_buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some(parse_record(&self.line_buf, self.line_no));
                }
                Err(source) => {
                    self.exhausted = true;
                    return Some(Err(SourceError::Read {
                        path: self.path.clone(),
                        source,
                    }));
                }
            }
        }
        None
    }
}

impl FusedIterator for JsonMessages {}

fn parse_record(line: &[u8], line_no: u64) -> Result<JsonMessage, SourceError> {
    let malformed = |reason: String| {
        SourceError::Record(MessageConversionError::MalformedRecord {
            line: line_no,
            reason,
        })
    };
    match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(fields)) => Ok(JsonMessage {
            fields,
            line: line_no,
        }),
        Ok(other) => Err(malformed(format!(
            "expected an object, found {}",
            kind_of(&other)
        ))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

/// One record of a message dump.
#[derive(Debug, Clone)]
pub struct JsonMessage {
    fields: Map<String, Value>,
    line: u64,
}

impl JsonMessage {
    /// Build a message from an already-parsed JSON object.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields, line: 0 }
    }

    /// Line of the dump this record was read from (0 when built in memory).
    pub fn line(&self) -> u64 {
        self.line
    }

    fn text(&self, key: &str) -> FieldResult<String> {
        text_value(self.fields.get(key))
    }

    fn attachment_table(&self) -> Result<Option<&Vec<Value>>, FieldDecodeError> {
        match self.fields.get("attachments") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(other) => Err(unexpected("array", other)),
        }
    }
}

impl SourceMessage for JsonMessage {
    type Attachment = JsonAttachment;
    type Recipient = JsonRecipient;

    fn subject(&self) -> FieldResult<String> {
        self.text("subject")
    }

    fn plain_text_body(&self) -> FieldResult<String> {
        self.text("plain_text_body")
    }

    fn html_body(&self) -> FieldResult<String> {
        self.text("html_body")
    }

    fn sender_name(&self) -> FieldResult<String> {
        self.text("sender_name")
    }

    fn sender_email(&self) -> FieldResult<String> {
        self.text("sender_email_address")
    }

    fn delivery_time(&self) -> FieldResult<Timestamp> {
        match self.fields.get("delivery_time") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Timestamp::parse(raw)
                .map(Some)
                .ok_or_else(|| FieldDecodeError::InvalidTimestamp(raw.clone())),
            Some(other) => Err(unexpected("timestamp", other)),
        }
    }

    fn transport_headers(&self) -> FieldResult<String> {
        self.text("transport_headers")
    }

    fn recipients(&self) -> FieldResult<Vec<JsonRecipient>> {
        match self.fields.get("recipients") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(
                items
                    .iter()
                    .map(|item| JsonRecipient {
                        value: item.clone(),
                    })
                    .collect(),
            )),
            Some(other) => Err(unexpected("array", other)),
        }
    }

    fn attachment_count(&self) -> FieldResult<usize> {
        if let Some(count) = u64_value(self.fields.get("attachment_count"))? {
            return usize::try_from(count)
                .map(Some)
                .map_err(|_| FieldDecodeError::OutOfRange(count.to_string()));
        }
        Ok(self.attachment_table()?.map(Vec::len))
    }

    fn attachment(&self, index: usize) -> Result<JsonAttachment, FieldDecodeError> {
        match self.attachment_table()?.and_then(|items| items.get(index)) {
            Some(Value::Object(fields)) => Ok(JsonAttachment {
                fields: fields.clone(),
            }),
            _ => Err(FieldDecodeError::NoSuchAttachment(index)),
        }
    }

    fn folder_name(&self) -> FieldResult<String> {
        match self.fields.get("folder") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(folder)) => text_value(folder.get("name")),
            Some(other) => Err(unexpected("folder object", other)),
        }
    }
}

/// A recipient entry of a [`JsonMessage`].
#[derive(Debug, Clone)]
pub struct JsonRecipient {
    value: Value,
}

impl JsonRecipient {
    fn text(&self, key: &str) -> FieldResult<String> {
        match &self.value {
            Value::Object(fields) => text_value(fields.get(key)),
            other => Err(unexpected("recipient object", other)),
        }
    }
}

impl SourceRecipient for JsonRecipient {
    fn email_address(&self) -> FieldResult<String> {
        self.text("email_address")
    }

    fn name(&self) -> FieldResult<String> {
        self.text("name")
    }
}

/// An attachment entry of a [`JsonMessage`].
#[derive(Debug, Clone)]
pub struct JsonAttachment {
    fields: Map<String, Value>,
}

impl SourceAttachment for JsonAttachment {
    fn name(&self) -> FieldResult<String> {
        text_value(self.fields.get("name"))
    }

    fn size(&self) -> FieldResult<u64> {
        u64_value(self.fields.get("size"))
    }

    fn read_buffer(&self, size: u64) -> FieldResult<Vec<u8>> {
        let Some(mut bytes) = bytes_value(self.fields.get("buffer"))? else {
            return Ok(None);
        };
        let limit = usize::try_from(size).unwrap_or(usize::MAX);
        bytes.truncate(limit);
        Ok(Some(bytes))
    }

    fn bulk_data(&self) -> FieldResult<Vec<u8>> {
        bytes_value(self.fields.get("stream"))
    }

    fn data(&self) -> FieldResult<Vec<u8>> {
        bytes_value(self.fields.get("data"))
    }
}

// ── Value decoding ──────────────────────────────────────────────

fn text_value(value: Option<&Value>) -> FieldResult<String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim_end_matches('\0').to_string())),
        Some(Value::Object(raw)) => decode_raw_text(raw).map(Some),
        Some(other) => Err(unexpected("text", other)),
    }
}

/// Decode `{"encoding": label, "base64": data}` without replacement characters.
fn decode_raw_text(raw: &Map<String, Value>) -> Result<String, FieldDecodeError> {
    let label = match raw.get("encoding") {
        None | Some(Value::Null) => "utf-8",
        Some(Value::String(label)) => label.as_str(),
        Some(other) => return Err(unexpected("encoding label", other)),
    };
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| FieldDecodeError::UnknownEncoding(label.to_string()))?;
    let bytes = bytes_value(raw.get("base64"))?.unwrap_or_default();

    let text = encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .ok_or_else(|| FieldDecodeError::MalformedText {
            encoding: encoding.name().to_string(),
        })?;
    Ok(text.trim_end_matches('\0').to_string())
}

fn bytes_value(value: Option<&Value>) -> FieldResult<Vec<u8>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(encoded)) => BASE64
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| FieldDecodeError::Base64(e.to_string())),
        Some(other) => Err(unexpected("base64 string", other)),
    }
}

fn u64_value(value: Option<&Value>) -> FieldResult<u64> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| FieldDecodeError::OutOfRange(n.to_string())),
        Some(other) => Err(unexpected("unsigned integer", other)),
    }
}

fn unexpected(expected: &'static str, found: &Value) -> FieldDecodeError {
    FieldDecodeError::UnexpectedType {
        expected,
        found: kind_of(found),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
