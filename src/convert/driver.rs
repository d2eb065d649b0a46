//! Conversion driver: runs every source message through the record builder.

use std::time::Instant;

use tracing::{error, info};

use super::builder::RecordBuilder;
use crate::error::{Result, SourceError};
use crate::export::mbox::{OutputArchive, OutputLock};
use crate::model::attachment::AttachmentTally;
use crate::model::stats::ConversionStats;
use crate::source::field::read_field;
use crate::source::{SourceArchive, SourceMessage};

/// Default number of processed messages between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

/// Folder name used when a message's folder cannot be read.
pub const DEFAULT_UNKNOWN_FOLDER: &str = "Unknown";

/// Drives a whole conversion run.
#[derive(Debug, Clone)]
pub struct ConversionDriver {
    builder: RecordBuilder,
    progress_interval: u64,
    unknown_folder: String,
}

impl Default for ConversionDriver {
    fn default() -> Self {
        Self::new(RecordBuilder::default())
    }
}

impl ConversionDriver {
    pub fn new(builder: RecordBuilder) -> Self {
        Self {
            builder,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            unknown_folder: DEFAULT_UNKNOWN_FOLDER.to_string(),
        }
    }

    /// Log a progress line every `interval` processed messages (0 disables it).
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_unknown_folder(mut self, name: impl Into<String>) -> Self {
        self.unknown_folder = name.into();
        self
    }

    /// Convert every message of `source` into `output`.
    ///
    /// The output archive is locked for the whole run and unlocked exactly
    /// once on every path. A message that fails is counted and skipped; only
    /// output errors abort the run. The progress callback receives the
    /// running statistics after every message.
    pub fn run<S, O>(
        &self,
        source: S,
        output: &mut O,
        progress: Option<&dyn Fn(&ConversionStats)>,
    ) -> Result<ConversionStats>
    where
        S: SourceArchive,
        O: OutputArchive + ?Sized,
    {
        let start = Instant::now();
        info!("Processing messages from source archive...");

        let mut lock = OutputLock::acquire(output)?;
        let outcome = self
            .process_all(source, lock.archive(), progress)
            .and_then(|stats| {
                lock.archive().flush()?;
                Ok(stats)
            });
        let released = lock.release();

        let mut stats = outcome?;
        released?;
        stats.elapsed = start.elapsed();
        Ok(stats)
    }

    fn process_all<S, O>(
        &self,
        source: S,
        output: &mut O,
        progress: Option<&dyn Fn(&ConversionStats)>,
    ) -> Result<ConversionStats>
    where
        S: SourceArchive,
        O: OutputArchive + ?Sized,
    {
        let mut stats = ConversionStats::default();

        for (index, item) in source.into_messages().enumerate() {
            let message = match item {
                Ok(message) => message,
                Err(SourceError::Record(e)) => {
                    stats.record_failure();
                    error!(index, error = %e, "Failed to process message");
                    notify(progress, &stats);
                    continue;
                }
                Err(e @ SourceError::Read { .. }) => {
                    error!(index, error = %e, "Failed to read source archive, stopping");
                    break;
                }
            };

            let folder = read_field(
                "folder.name",
                || message.folder_name(),
                self.unknown_folder.clone(),
            );

            let mut tally = AttachmentTally::default();
            let outcome = self.builder.build(&message, &folder, &mut tally);
            stats.absorb(&tally);

            match outcome {
                Ok(record) => {
                    output.append(&record)?;
                    stats.record_success();
                    if self.progress_interval > 0 && stats.processed % self.progress_interval == 0 {
                        info!("Processed {} emails...", stats.processed);
                    }
                }
                Err(e) => {
                    stats.record_failure();
                    error!(index, error = %e, "Failed to process message");
                }
            }
            notify(progress, &stats);
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Finished processing {} messages",
            stats.total()
        );
        Ok(stats)
    }
}

fn notify(progress: Option<&dyn Fn(&ConversionStats)>, stats: &ConversionStats) {
    if let Some(cb) = progress {
        cb(stats);
    }
}
