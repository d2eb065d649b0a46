//! Attachments recovered from a source message.

/// One attachment enumerated from a source message.
///
/// Lives only for the duration of a single message conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Filename from the archive, or `attachment_{index}` when missing.
    pub filename: String,

    /// Size recorded in the archive (0 when unknown).
    pub declared_size: u64,

    /// Recovered bytes. `None` when every recovery method failed.
    pub data: Option<Vec<u8>>,
}

impl AttachmentRef {
    /// Number of bytes actually recovered.
    pub fn recovered_len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// Whether this attachment has content worth emitting.
    pub fn has_data(&self) -> bool {
        self.recovered_len() > 0
    }
}

/// Per-message attachment counters, merged into the run statistics by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentTally {
    /// Attachment table slots enumerated.
    pub found: u64,
    /// Attachments with non-empty recovered content.
    pub extracted: u64,
    /// Total recovered bytes.
    pub bytes: u64,
}

impl AttachmentTally {
    /// Count one enumerated slot.
    pub fn note_found(&mut self) {
        self.found += 1;
    }

    /// Count a recovered attachment; empty ones only count as found.
    pub fn note_recovered(&mut self, attachment: &AttachmentRef) {
        let len = attachment.recovered_len();
        if len > 0 {
            self.extracted += 1;
            self.bytes += len as u64;
        }
    }
}
