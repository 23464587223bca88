//! Queue directory management.
//!
//! A queue lives in its own directory under the caller's base path:
//!
//! ```text
//! <base>/<name>/
//! ├─ <name>.lock           # advisory lock for single-process access
//! ├─ 0000000000000001.que  # first segment
//! ├─ 0000000000000002.que
//! └─ ...
//! ```
//!
//! Segment files are named by their 16-digit zero-padded sequence number,
//! so lexical and numeric ordering agree. The lock file lives inside the
//! queue directory: removing the directory removes the lock with it.

use crate::error::{QueueError, QueueResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix for segment files.
const SEGMENT_SUFFIX: &str = "que";

/// Handle on a queue directory, holding its advisory lock.
///
/// Only one `QueueDir` can exist per directory at a time; a second open
/// from any process fails with
/// [`AlreadyLocked`](QueueError::AlreadyLocked).
#[derive(Debug)]
pub(crate) struct QueueDir {
    path: PathBuf,
    lock_path: PathBuf,
    lock_file: Option<File>,
}

impl QueueDir {
    /// Creates a fresh queue directory and locks it.
    ///
    /// `base` must exist; `base/name` must not.
    pub(crate) fn create(base: &Path, name: &str) -> QueueResult<Self> {
        if !base.is_dir() {
            return Err(QueueError::not_found(base.display().to_string()));
        }

        let path = base.join(name);
        if path.exists() {
            return Err(QueueError::already_exists(path.display().to_string()));
        }
        fs::create_dir(&path)?;

        Self::lock(path, name)
    }

    /// Opens an existing queue directory and locks it.
    pub(crate) fn load(base: &Path, name: &str) -> QueueResult<Self> {
        let path = base.join(name);
        if !path.is_dir() {
            return Err(QueueError::not_found(path.display().to_string()));
        }

        Self::lock(path, name)
    }

    /// Acquires the non-blocking advisory lock on `<path>/<name>.lock`.
    fn lock(path: PathBuf, name: &str) -> QueueResult<Self> {
        let lock_path = path.join(format!("{name}.lock"));
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(QueueError::AlreadyLocked);
        }

        debug!(path = %path.display(), "acquired queue lock");
        Ok(Self {
            path,
            lock_path,
            lock_file: Some(lock_file),
        })
    }

    /// Releases the lock and removes the lock file.
    pub(crate) fn release(&mut self) -> QueueResult<()> {
        if let Some(lock_file) = self.lock_file.take() {
            // Unlocks on close; explicit unlock surfaces errors instead.
            lock_file.unlock()?;
            fs::remove_file(&self.lock_path)?;
            debug!(path = %self.path.display(), "released queue lock");
        }
        Ok(())
    }

    /// Returns the queue directory path.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment file for `sequence`.
    pub(crate) fn segment_path(&self, sequence: u64) -> PathBuf {
        self.path.join(format!("{sequence:016}.{SEGMENT_SUFFIX}"))
    }

    /// Scans for segment files and returns the live sequence range.
    ///
    /// Returns `None` when the directory holds no segment files. Files
    /// that do not match the `{:016}.que` pattern (the lock file, editor
    /// droppings) are ignored.
    pub(crate) fn segment_range(&self) -> QueueResult<Option<(u64, u64)>> {
        let mut range: Option<(u64, u64)> = None;

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(sequence) = parse_segment_name(&file_name.to_string_lossy()) else {
                continue;
            };
            range = Some(match range {
                None => (sequence, sequence),
                Some((min, max)) => (min.min(sequence), max.max(sequence)),
            });
        }

        Ok(range)
    }

    /// Fsyncs the queue directory so file creation and removal are
    /// durable. Metadata journaling covers this on non-Unix platforms.
    #[cfg(unix)]
    pub(crate) fn sync(&self) -> QueueResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn sync(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Parses a `{:016}.que` file name into its sequence number.
fn parse_segment_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{SEGMENT_SUFFIX}"))?;
    if stem.len() != 16 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
