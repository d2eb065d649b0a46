//! Attachment extraction with tiered byte recovery.
//!
//! Damaged attachment tables are common in old archives, so every failure
//! here is local to one attachment: a slot that cannot be fetched is
//! skipped, and bytes are recovered by trying each read method in turn.

use tracing::{debug, warn};

use crate::error::FieldResult;
use crate::model::attachment::{AttachmentRef, AttachmentTally};
use crate::source::field::{read_field, read_text};
use crate::source::{SourceAttachment, SourceMessage};

/// Upper bound on enumerated slots, guarding against corrupted counts.
const MAX_ATTACHMENTS_PER_MESSAGE: usize = 10_000;

/// Enumerate and recover the attachments of `message`.
///
/// Every enumerated slot is counted in `tally`, including slots that
/// could not be fetched.
pub fn extract<M: SourceMessage>(message: &M, tally: &mut AttachmentTally) -> Vec<AttachmentRef> {
    let declared = read_field("attachment_count", || message.attachment_count(), 0);
    if declared == 0 {
        return Vec::new();
    }
    debug!(count = declared, "Message has attachment(s)");

    let count = if declared > MAX_ATTACHMENTS_PER_MESSAGE {
        warn!(
            declared,
            limit = MAX_ATTACHMENTS_PER_MESSAGE,
            "Attachment count looks corrupted, enumerating only the first entries"
        );
        MAX_ATTACHMENTS_PER_MESSAGE
    } else {
        declared
    };

    let mut attachments = Vec::with_capacity(count.min(16));
    for index in 0..count {
        tally.note_found();

        let handle = match message.attachment(index) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(index, error = %e, "Failed to extract attachment");
                continue;
            }
        };

        let filename =
            read_text("attachment.name", || handle.name()).unwrap_or_else(|| format!("attachment_{index}"));
        let declared_size = read_field("attachment.size", || handle.size(), 0);
        let data = recover_bytes(&handle, &filename, declared_size);

        let attachment = AttachmentRef {
            filename,
            declared_size,
            data,
        };
        let actual_size = attachment.recovered_len();
        if attachment.data.is_none() {
            warn!(
                filename = %attachment.filename,
                declared_size,
                "No recovery method returned attachment data"
            );
        } else if actual_size == 0 && declared_size > 0 {
            warn!(
                filename = %attachment.filename,
                declared_size,
                "Attachment reported a size but its data is empty"
            );
        } else {
            debug!(
                filename = %attachment.filename,
                bytes = actual_size,
                "Found attachment"
            );
        }

        tally.note_recovered(&attachment);
        attachments.push(attachment);
    }

    attachments
}

/// Try, in order, a sized buffer read, a bulk read and the raw data field.
///
/// The first method that returns bytes wins, even if they are empty.
fn recover_bytes<A: SourceAttachment>(
    handle: &A,
    filename: &str,
    declared_size: u64,
) -> Option<Vec<u8>> {
    if declared_size > 0 {
        if let Some(bytes) = try_method(filename, "read_buffer", || handle.read_buffer(declared_size)) {
            return Some(bytes);
        }
    }
    if let Some(bytes) = try_method(filename, "bulk_data", || handle.bulk_data()) {
        return Some(bytes);
    }
    try_method(filename, "data", || handle.data())
}

fn try_method(
    filename: &str,
    method: &'static str,
    read: impl FnOnce() -> FieldResult<Vec<u8>>,
) -> Option<Vec<u8>> {
    match read() {
        Ok(Some(bytes)) => Some(bytes),
        Ok(None) => {
            debug!(filename, method, "Recovery method unavailable");
            None
        }
        Err(e) => {
            debug!(filename, method, error = %e, "Recovery method failed");
            None
        }
    }
}
