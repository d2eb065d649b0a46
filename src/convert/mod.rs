//! The message-to-record conversion pipeline.
//!
//! [`attachment`] and [`header`] recover what they can from a damaged
//! source message, [`builder`] assembles the output record, and [`driver`]
//! runs the whole archive through it.

pub mod attachment;
pub mod builder;
pub mod driver;
pub mod header;

use std::path::Path;

use humansize::{format_size, BINARY};
use tracing::{info, warn};

use crate::error::{ConvertError, Result};
use crate::export::mbox::MboxWriter;
use crate::model::stats::ConversionStats;
use crate::source::json::JsonArchive;

use driver::ConversionDriver;

/// File extensions recognized as message dumps.
const DUMP_EXTENSIONS: &[&str] = &["jsonl", "json", "ndjson"];

/// Check that `input` exists and is a regular file.
pub fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(ConvertError::FileNotFound(input.to_path_buf()));
    }
    if !input.is_file() {
        return Err(ConvertError::InvalidPath(format!(
            "input is not a file: {}",
            input.display()
        )));
    }
    Ok(())
}

/// Whether `input` carries one of the message dump extensions.
pub fn has_dump_extension(input: &Path) -> bool {
    input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DUMP_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
}

/// Convert the dump at `input` into the mbox at `output`.
///
/// With `append` the existing mbox content is kept, otherwise the file is
/// truncated once the lock is held.
pub fn convert_file(
    input: &Path,
    output: &Path,
    driver: &ConversionDriver,
    append: bool,
    progress: Option<&dyn Fn(&ConversionStats)>,
) -> Result<ConversionStats> {
    validate_input(input)?;
    if !has_dump_extension(input) {
        warn!(path = %input.display(), "File extension is not .jsonl, reading it anyway");
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::output(parent, e))?;
    }

    let source = JsonArchive::open(input)?;
    info!(
        path = %input.display(),
        size = %format_size(source.file_size(), BINARY),
        "Opened source archive"
    );

    let mut mbox = if append {
        MboxWriter::append_to(output)?
    } else {
        MboxWriter::create(output)?
    };

    let mut stats = driver.run(source, &mut mbox, progress)?;
    mbox.close()?;

    stats.total_output_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    Ok(stats)
}
