//! Aggregate statistics for one conversion run.

use std::time::Duration;

use super::attachment::AttachmentTally;

/// Counters accumulated by the conversion driver.
///
/// Counters only ever grow; they are updated once a message's outcome is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionStats {
    /// Messages appended to the output archive.
    pub processed: u64,
    /// Messages that could not be converted.
    pub failed: u64,
    /// Attachment slots enumerated across all messages.
    pub attachments_found: u64,
    /// Attachments with recovered content.
    pub attachments_extracted: u64,
    /// Total recovered attachment bytes.
    pub attachment_bytes: u64,
    /// Size of the output archive once closed.
    pub total_output_size: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl ConversionStats {
    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Merge a message's attachment counters.
    pub fn absorb(&mut self, tally: &AttachmentTally) {
        self.attachments_found += tally.found;
        self.attachments_extracted += tally.extracted;
        self.attachment_bytes += tally.bytes;
    }

    /// Messages seen, successful or not.
    pub fn total(&self) -> u64 {
        self.processed + self.failed
    }

    /// Processed messages per second, `None` before anything was timed.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.processed == 0 || secs <= 0.0 {
            None
        } else {
            Some(self.processed as f64 / secs)
        }
    }
}
