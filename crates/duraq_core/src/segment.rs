//! Append-only queue segments.
//!
//! A segment is one `.que` file on disk plus a ring deque mirroring its
//! live contents. The file is a sequence of frames:
//!
//! ```text
//! | len:u32_le | payload[len] |     a record (len > 0)
//! | 0:u32_le   |                    a tombstone (head record removed)
//! ```
//!
//! Frames are strictly append-only: a dequeue does not rewrite the file,
//! it appends a tombstone. Loading a segment replays its frames in order,
//! enqueueing records into the mirror and popping one for each tombstone,
//! which reconstructs exactly the live contents at the moment of the last
//! completed write.
//!
//! ## Recovery policy
//!
//! - Clean end-of-file at a frame boundary ends replay successfully; in
//!   `Lazy` mode a crash can lose the unsynced tail and this is how the
//!   loss appears.
//! - A file that ends mid-frame (inside a length word or a payload) is
//!   `Corrupt`.
//! - A tombstone with no live record to remove is `Corrupt`.
//!
//! ## Invariants
//!
//! - `size_on_disk() == memory.size() + remove_count` equals the number
//!   of record frames ever written; it never decreases while the segment
//!   is live and is the occupancy metric the directory rolls over on.
//! - The file handle is always positioned at end-of-file.

use crate::config::SyncMode;
use crate::error::{QueueError, QueueResult};
use crate::queue::Queue;
use crate::ring::RingDeque;
use duraq_codec::{Decode, Encode};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use tracing::debug;

/// Length prefix size for a frame.
const FRAME_HEADER: usize = 4;

/// The tombstone frame: a zero length word with no payload.
const TOMBSTONE: [u8; FRAME_HEADER] = [0; FRAME_HEADER];

/// One append-only segment file and its in-memory mirror.
///
/// Segments are passive: the owning [`DiskQueue`](crate::DiskQueue)
/// decides when to create, roll over, reclaim, and delete them. Each
/// segment carries its own lock so the head and tail of a queue can be
/// driven concurrently; the directory always locks itself before locking
/// a segment.
pub(crate) struct Segment<T> {
    sequence: u64,
    path: PathBuf,
    inner: Mutex<SegmentInner<T>>,
}

struct SegmentInner<T> {
    file: Option<File>,
    memory: RingDeque<T>,
    remove_count: usize,
    mode: SyncMode,
    dirty: bool,
}

impl<T> SegmentInner<T> {
    fn file_mut(&mut self) -> QueueResult<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            QueueError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "segment file is closed",
            ))
        })
    }

    fn sync(&mut self) -> QueueResult<()> {
        if self.mode == SyncMode::Lazy {
            self.dirty = true;
            return Ok(());
        }
        self.file_mut()?.sync_all()?;
        self.dirty = false;
        Ok(())
    }
}

impl<T> Segment<T> {
    /// Returns this segment's sequence number.
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of live records in the mirror.
    pub(crate) fn size(&self) -> usize {
        self.inner.lock().memory.size()
    }

    /// Number of record frames ever written: live records plus
    /// tombstoned ones. Monotone until the segment is deleted.
    pub(crate) fn size_on_disk(&self) -> usize {
        let inner = self.inner.lock();
        inner.memory.size() + inner.remove_count
    }

    /// Whether unsynced writes are pending (`Lazy` mode only).
    #[cfg(test)]
    pub(crate) fn dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Fsyncs the file regardless of mode.
    pub(crate) fn flush(&self) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        inner.file_mut()?.sync_all()?;
        inner.dirty = false;
        Ok(())
    }

    /// Closes the file handle, leaving the file on disk.
    pub(crate) fn close(&self) -> QueueResult<()> {
        self.inner.lock().file.take();
        Ok(())
    }

    /// Closes the file handle and removes the file.
    pub(crate) fn delete(&self) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        inner.file.take();
        fs::remove_file(&self.path)?;
        inner.memory.clear();
        debug!(sequence = self.sequence, "deleted segment");
        Ok(())
    }
}

impl<T: Encode + Decode> Segment<T> {
    /// Creates a fresh segment file.
    ///
    /// The parent directory must exist and the file must not.
    pub(crate) fn create(
        path: PathBuf,
        capacity: usize,
        sequence: u64,
        mode: SyncMode,
    ) -> QueueResult<Self> {
        match path.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Err(QueueError::not_found(path.display().to_string())),
        }
        if path.exists() {
            return Err(QueueError::already_exists(path.display().to_string()));
        }

        let file = OpenOptions::new().append(true).create_new(true).open(&path)?;

        Ok(Self {
            sequence,
            path,
            inner: Mutex::new(SegmentInner {
                file: Some(file),
                memory: RingDeque::new(capacity),
                remove_count: 0,
                mode,
                dirty: false,
            }),
        })
    }

    /// Loads an existing segment file, replaying every frame.
    ///
    /// After replay the file is reopened for appending.
    pub(crate) fn load(
        path: PathBuf,
        capacity: usize,
        sequence: u64,
        mode: SyncMode,
    ) -> QueueResult<Self> {
        if !path.is_file() {
            return Err(QueueError::not_found(path.display().to_string()));
        }

        let mut memory = RingDeque::new(capacity);
        let mut remove_count = 0usize;
        let mut records = 0usize;

        let mut reader = BufReader::new(File::open(&path)?);
        while let Some(len) = read_frame_len(&mut reader, sequence)? {
            if len == 0 {
                memory.dequeue().map_err(|_| {
                    QueueError::corrupt(format!(
                        "segment {sequence}: tombstone with no record to remove"
                    ))
                })?;
                remove_count += 1;
                continue;
            }

            let mut payload = vec![0u8; len as usize];
            reader.read_exact(&mut payload).map_err(|err| {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    QueueError::corrupt(format!("segment {sequence}: truncated record payload"))
                } else {
                    QueueError::Io(err)
                }
            })?;

            memory.enqueue(T::decode(&payload)?)?;
            records += 1;
        }
        drop(reader);

        let file = OpenOptions::new().append(true).open(&path)?;
        debug!(
            sequence,
            records,
            tombstones = remove_count,
            "replayed segment"
        );

        Ok(Self {
            sequence,
            path,
            inner: Mutex::new(SegmentInner {
                file: Some(file),
                memory,
                remove_count,
                mode,
                dirty: false,
            }),
        })
    }

    /// Appends one record: frame to the file, value to the mirror.
    pub(crate) fn enqueue(&self, value: T) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        write_record(inner.file_mut()?, &value)?;
        inner.memory.enqueue(value)?;
        inner.sync()
    }

    /// Appends records in order, returning how many were written.
    ///
    /// On a write failure the records already on disk are still pushed
    /// into the mirror before the error surfaces, so file and memory
    /// agree on the durable prefix.
    pub(crate) fn enqueue_batch(&self, values: Vec<T>) -> QueueResult<usize> {
        let mut inner = self.inner.lock();
        let mut written = Vec::with_capacity(values.len());
        let mut failure = None;

        for value in values {
            match write_record(inner.file_mut()?, &value) {
                Ok(()) => written.push(value),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let count = written.len();
        inner.memory.enqueue_batch(written)?;
        match failure {
            Some(err) => {
                let _ = inner.sync();
                Err(err)
            }
            None => {
                inner.sync()?;
                Ok(count)
            }
        }
    }

    /// Removes the head record: tombstone to the file, pop the mirror.
    pub(crate) fn dequeue(&self) -> QueueResult<T> {
        let mut inner = self.inner.lock();
        if inner.memory.size() == 0 {
            return Err(QueueError::Empty);
        }

        inner.file_mut()?.write_all(&TOMBSTONE)?;
        let value = inner.memory.dequeue()?;
        inner.remove_count += 1;
        inner.sync()?;
        Ok(value)
    }

    /// Removes up to `count` head records.
    pub(crate) fn dequeue_batch(&self, count: usize) -> QueueResult<Vec<T>> {
        let mut inner = self.inner.lock();
        if inner.memory.size() == 0 {
            return Err(QueueError::Empty);
        }

        let values = inner.memory.dequeue_batch(count)?;
        for _ in 0..values.len() {
            inner.file_mut()?.write_all(&TOMBSTONE)?;
        }
        inner.remove_count += values.len();
        inner.sync()?;
        Ok(values)
    }
}

/// Encodes `value` and appends its frame to `file`.
fn write_record<T: Encode>(file: &mut File, value: &T) -> QueueResult<()> {
    let payload = value.encode()?;
    if payload.is_empty() {
        return Err(duraq_codec::CodecError::encoding_failed(
            "encoded record is empty; zero length is reserved for tombstones",
        )
        .into());
    }

    let len = u32::try_from(payload.len()).map_err(|_| {
        QueueError::Codec(duraq_codec::CodecError::encoding_failed(
            "encoded record exceeds 4 GiB frame limit",
        ))
    })?;

    file.write_all(&len.to_le_bytes())?;
    file.write_all(&payload)?;
    Ok(())
}

/// Reads the next frame length.
///
/// `Ok(None)` on clean end-of-file before any length byte; `Corrupt` if
/// the file ends inside the length word.
fn read_frame_len(reader: &mut impl Read, sequence: u64) -> QueueResult<Option<u32>> {
    let mut buf = [0u8; FRAME_HEADER];
    let mut filled = 0;
    while filled < FRAME_HEADER {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(QueueError::corrupt(format!(
                "segment {sequence}: truncated frame length"
            )));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn seg_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!("{sequence:016}.que"))
    }

    fn new_segment(dir: &Path, sequence: u64) -> Segment<String> {
        Segment::create(seg_path(dir, sequence), 8, sequence, SyncMode::Durable).unwrap()
    }

    #[test]
    fn create_fails_if_file_exists() {
        let dir = tempdir().unwrap();
        let _seg = new_segment(dir.path(), 1);

        let again: QueueResult<Segment<String>> =
            Segment::create(seg_path(dir.path(), 1), 8, 1, SyncMode::Durable);
        assert!(matches!(again, Err(QueueError::AlreadyExists { .. })));
    }

    #[test]
    fn create_fails_if_directory_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let result: QueueResult<Segment<String>> =
            Segment::create(seg_path(&missing, 1), 8, 1, SyncMode::Durable);
        assert!(matches!(result, Err(QueueError::NotFound { .. })));
    }

    #[test]
    fn load_fails_if_file_missing() {
        let dir = tempdir().unwrap();
        let result: QueueResult<Segment<String>> =
            Segment::load(seg_path(dir.path(), 7), 8, 7, SyncMode::Durable);
        assert!(matches!(result, Err(QueueError::NotFound { .. })));
    }

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);

        seg.enqueue("one".to_string()).unwrap();
        seg.enqueue("two".to_string()).unwrap();
        assert_eq!(seg.size(), 2);
        assert_eq!(seg.size_on_disk(), 2);

        assert_eq!(seg.dequeue().unwrap(), "one");
        assert_eq!(seg.size(), 1);
        // Tombstones shrink the mirror but not the frame count.
        assert_eq!(seg.size_on_disk(), 2);
    }

    #[test]
    fn dequeue_empty_fails() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);
        assert!(matches!(seg.dequeue(), Err(QueueError::Empty)));
        assert!(matches!(seg.dequeue_batch(3), Err(QueueError::Empty)));
    }

    #[test]
    fn replay_restores_live_contents() {
        let dir = tempdir().unwrap();
        {
            let seg = new_segment(dir.path(), 1);
            for i in 0..5 {
                seg.enqueue(format!("Hi {i}")).unwrap();
            }
            seg.dequeue().unwrap();
            seg.dequeue().unwrap();
            seg.close().unwrap();
        }

        let seg: Segment<String> =
            Segment::load(seg_path(dir.path(), 1), 8, 1, SyncMode::Durable).unwrap();
        assert_eq!(seg.size(), 3);
        assert_eq!(seg.size_on_disk(), 5);
        assert_eq!(seg.dequeue().unwrap(), "Hi 2");
    }

    #[test]
    fn replay_then_append_continues_the_log() {
        let dir = tempdir().unwrap();
        {
            let seg = new_segment(dir.path(), 1);
            seg.enqueue("a".to_string()).unwrap();
            seg.close().unwrap();
        }

        let seg: Segment<String> =
            Segment::load(seg_path(dir.path(), 1), 8, 1, SyncMode::Durable).unwrap();
        seg.enqueue("b".to_string()).unwrap();
        seg.close().unwrap();

        let seg: Segment<String> =
            Segment::load(seg_path(dir.path(), 1), 8, 1, SyncMode::Durable).unwrap();
        assert_eq!(seg.dequeue().unwrap(), "a");
        assert_eq!(seg.dequeue().unwrap(), "b");
    }

    #[test]
    fn batch_enqueue_counts_and_orders() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);

        let written = seg
            .enqueue_batch(vec!["x".to_string(), "y".to_string(), "z".to_string()])
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(seg.size_on_disk(), 3);

        let batch = seg.dequeue_batch(2).unwrap();
        assert_eq!(batch, vec!["x", "y"]);
        assert_eq!(seg.size(), 1);
        assert_eq!(seg.size_on_disk(), 3);
    }

    #[test]
    fn dequeue_batch_caps_at_live_size() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);
        seg.enqueue_batch(vec!["a".to_string(), "b".to_string()])
            .unwrap();

        let batch = seg.dequeue_batch(10).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(seg.size(), 0);
    }

    #[test]
    fn replay_empty_file_is_empty_segment() {
        let dir = tempdir().unwrap();
        fs::write(seg_path(dir.path(), 2), b"").unwrap();

        let seg: Segment<String> =
            Segment::load(seg_path(dir.path(), 2), 8, 2, SyncMode::Durable).unwrap();
        assert_eq!(seg.size(), 0);
        assert_eq!(seg.size_on_disk(), 0);
    }

    #[test]
    fn replay_truncated_length_is_corrupt() {
        let dir = tempdir().unwrap();
        {
            let seg = new_segment(dir.path(), 1);
            seg.enqueue("keep".to_string()).unwrap();
            seg.close().unwrap();
        }
        // Append two stray bytes: a frame length cut short.
        let path = seg_path(dir.path(), 1);
        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(&[0x05, 0x00]);
        fs::write(&path, &raw).unwrap();

        let result: QueueResult<Segment<String>> = Segment::load(path, 8, 1, SyncMode::Durable);
        assert!(matches!(result, Err(QueueError::Corrupt { .. })));
    }

    #[test]
    fn replay_truncated_payload_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = seg_path(dir.path(), 1);
        // Length claims 10 bytes, only 3 present.
        let mut raw = 10u32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"abc");
        fs::write(&path, &raw).unwrap();

        let result: QueueResult<Segment<String>> = Segment::load(path, 8, 1, SyncMode::Durable);
        assert!(matches!(result, Err(QueueError::Corrupt { .. })));
    }

    #[test]
    fn replay_tombstone_on_empty_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = seg_path(dir.path(), 1);
        fs::write(&path, TOMBSTONE).unwrap();

        let result: QueueResult<Segment<String>> = Segment::load(path, 8, 1, SyncMode::Durable);
        assert!(matches!(result, Err(QueueError::Corrupt { .. })));
    }

    #[test]
    fn lazy_mode_marks_dirty_instead_of_syncing() {
        let dir = tempdir().unwrap();
        let seg: Segment<String> =
            Segment::create(seg_path(dir.path(), 1), 8, 1, SyncMode::Lazy).unwrap();

        seg.enqueue("unsynced".to_string()).unwrap();
        assert!(seg.dirty());

        seg.flush().unwrap();
        assert!(!seg.dirty());
    }

    #[test]
    fn delete_removes_file_and_clears_mirror() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);
        seg.enqueue("gone".to_string()).unwrap();

        seg.delete().unwrap();
        assert!(!seg_path(dir.path(), 1).exists());
        assert_eq!(seg.size(), 0);
    }

    #[test]
    fn size_on_disk_is_monotone() {
        let dir = tempdir().unwrap();
        let seg = new_segment(dir.path(), 1);

        let mut last = 0;
        for i in 0..6 {
            seg.enqueue(format!("m{i}")).unwrap();
            assert!(seg.size_on_disk() >= last);
            last = seg.size_on_disk();
        }
        for _ in 0..6 {
            seg.dequeue().unwrap();
            assert!(seg.size_on_disk() >= last);
            last = seg.size_on_disk();
        }
        assert_eq!(last, 6);
    }
}
