//! Append-only mbox archive writer with an exclusive advisory lock.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::mime;
use crate::error::{ConvertError, Result};
use crate::model::mail::Timestamp;
use crate::model::record::{OutputRecord, DEFAULT_ENVELOPE_SENDER};

/// A destination that accepts finished records.
///
/// Callers hold the lock for the whole run: `lock`, any number of `append`
/// calls, `flush`, then `unlock`. Use [`OutputLock`] rather than calling
/// `lock`/`unlock` directly.
pub trait OutputArchive {
    fn lock(&mut self) -> Result<()>;
    /// Append one record, returning the number of bytes written.
    fn append(&mut self, record: &OutputRecord) -> Result<u64>;
    fn flush(&mut self) -> Result<()>;
    fn unlock(&mut self) -> Result<()>;
}

/// Scoped lock on an [`OutputArchive`].
///
/// The lock is released exactly once: explicitly through [`release`], or on
/// drop if an early return skipped it.
///
/// [`release`]: OutputLock::release
pub struct OutputLock<'a, O: OutputArchive + ?Sized> {
    archive: &'a mut O,
    held: bool,
}

impl<'a, O: OutputArchive + ?Sized> OutputLock<'a, O> {
    pub fn acquire(archive: &'a mut O) -> Result<Self> {
        archive.lock()?;
        Ok(Self {
            archive,
            held: true,
        })
    }

    pub fn archive(&mut self) -> &mut O {
        self.archive
    }

    /// Unlock now and report the outcome.
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.archive.unlock()
    }
}

impl<O: OutputArchive + ?Sized> Drop for OutputLock<'_, O> {
    fn drop(&mut self) {
        if self.held {
            self.held = false;
            if let Err(e) = self.archive.unlock() {
                warn!(error = %e, "Failed to unlock output archive");
            }
        }
    }
}

/// Whether existing content is discarded when the lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Truncate,
    Append,
}

/// An mbox file on disk.
///
/// Records are separated by a `From ` envelope line; body lines that
/// would be mistaken for one are escaped as `>From `.
pub struct MboxWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    mode: OpenMode,
    locked: bool,
    bytes_written: u64,
}

impl MboxWriter {
    /// Open `path` for writing. Existing content is discarded once the lock
    /// is held, so a locked-out run leaves the other writer's data intact.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ConvertError::output(path, e))?;
        Ok(Self::new(path, file, OpenMode::Truncate))
    }

    /// Open `path` for appending after any existing messages.
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| ConvertError::output(path, e))?;
        Ok(Self::new(path, file, OpenMode::Append))
    }

    fn new(path: &Path, file: File, mode: OpenMode) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(256 * 1024, file),
            mode,
            locked: false,
            bytes_written: 0,
        }
    }

    /// Bytes appended through this writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and close. Unlocks first if still locked.
    pub fn close(mut self) -> Result<()> {
        if self.locked {
            self.unlock()?;
        }
        self.writer
            .flush()
            .map_err(|e| ConvertError::output(&self.path, e))?;
        debug!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            "Closed output archive"
        );
        Ok(())
    }

    fn io_err(&self, e: std::io::Error) -> ConvertError {
        ConvertError::output(&self.path, e)
    }

    /// An appended run must start on a fresh line.
    fn needs_leading_newline(&self) -> std::io::Result<bool> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }
}

impl OutputArchive for MboxWriter {
    fn lock(&mut self) -> Result<()> {
        match self.writer.get_ref().try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(ConvertError::OutputLocked(self.path.clone()));
            }
            Err(TryLockError::Error(e)) => return Err(self.io_err(e)),
        }
        self.locked = true;
        debug!(path = %self.path.display(), "Locked output archive");

        match self.mode {
            OpenMode::Truncate => {
                let file = self.writer.get_mut();
                file.set_len(0)
                    .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
                    .map_err(|e| ConvertError::output(&self.path, e))?;
            }
            OpenMode::Append => {
                if self.needs_leading_newline().map_err(|e| self.io_err(e))? {
                    self.writer.write_all(b"\n").map_err(|e| self.io_err(e))?;
                }
            }
        }
        Ok(())
    }

    fn append(&mut self, record: &OutputRecord) -> Result<u64> {
        if !self.locked {
            return Err(self.io_err(std::io::Error::other(
                "output archive must be locked before appending",
            )));
        }

        let envelope = match &record.envelope {
            Some(envelope) => envelope.render(),
            None => format!(
                "From {} {}",
                DEFAULT_ENVELOPE_SENDER,
                Timestamp::now().to_envelope_date()
            ),
        };

        let mut buf = String::with_capacity(envelope.len() + 1024);
        buf.push_str(&envelope);
        buf.push('\n');
        for line in mime::render_message(record).lines() {
            if line.starts_with("From ") {
                buf.push('>');
            }
            buf.push_str(line);
            buf.push('\n');
        }
        buf.push('\n');

        self.writer
            .write_all(buf.as_bytes())
            .map_err(|e| self.io_err(e))?;
        let written = buf.len() as u64;
        self.bytes_written += written;
        Ok(written)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.io_err(e))?;
        self.writer.get_ref().sync_all().map_err(|e| self.io_err(e))
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.locked {
            return Ok(());
        }
        // The lock is dropped even when pending bytes cannot be written.
        let flushed = self.writer.flush();
        self.locked = false;
        let unlocked = self.writer.get_ref().unlock();
        flushed.map_err(|e| self.io_err(e))?;
        unlocked.map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), "Unlocked output archive");
        Ok(())
    }
}
