//! Durable disk-backed queue.
//!
//! A [`DiskQueue`] is a locked directory holding an ordered series of
//! append-only segment files. Producers append to the *tail* segment;
//! consumers pop from the *head* segment. When the tail reaches the
//! configured record capacity it is sealed and a new tail is created
//! (roll-over); when the head is fully consumed it is deleted and the
//! next segment takes its place (reclamation). Between head and tail,
//! sealed segments sit on disk with no memory footprint.
//!
//! ## Locking
//!
//! One mutex guards the `(head, tail)` pair, the roll-over protocol, and
//! the directory handle; each segment additionally carries its own lock.
//! Acquisition order is always directory state first, then segment. A
//! condition variable paired with the state mutex signals emptiness to
//! [`dequeue_blocking`](DiskQueue::dequeue_blocking) waiters.
//!
//! ## Size identity
//!
//! With head and tail on the same segment the logical size is the head's
//! live count; otherwise it is `head.size + (gap segments ×
//! segment_capacity) + tail.size`. The roll-over rule guarantees every
//! sealed intermediate segment holds exactly `segment_capacity` record
//! frames, which makes the aggregation exact.

use crate::config::{QueueConfig, SyncMode};
use crate::dir::QueueDir;
use crate::error::{QueueError, QueueResult};
use crate::queue::Queue;
use crate::segment::Segment;
use crate::stats::QueueStats;
use duraq_codec::{Decode, Encode};
use parking_lot::{Condvar, Mutex};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A durable FIFO queue persisted under `<base>/<name>/`.
///
/// All methods take `&self`; the queue synchronises internally and can be
/// shared across threads behind an [`Arc`]. It also implements the
/// [`Queue`] contract so callers can swap it for the in-memory
/// [`RingDeque`](crate::RingDeque).
///
/// # Example
///
/// ```no_run
/// use duraq_core::{DiskQueue, QueueConfig};
///
/// let queue: DiskQueue<String> =
///     DiskQueue::create("/var/lib/ingest", "readings", QueueConfig::new().segment_capacity(4096))?;
/// queue.enqueue("reading 1".to_string())?;
/// assert_eq!(queue.dequeue()?, "reading 1");
/// # Ok::<(), duraq_core::QueueError>(())
/// ```
pub struct DiskQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    segment_capacity: usize,
    mode: SyncMode,
}

struct State<T> {
    dir: QueueDir,
    head: Arc<Segment<T>>,
    tail: Arc<Segment<T>>,
    closed: bool,
}

impl<T: Encode + Decode> DiskQueue<T> {
    /// Creates a new queue directory under `base` and opens it.
    ///
    /// # Errors
    ///
    /// - [`NotFound`](QueueError::NotFound) if `base` does not exist
    /// - [`AlreadyExists`](QueueError::AlreadyExists) if `base/name` does
    /// - [`AlreadyLocked`](QueueError::AlreadyLocked) if another process
    ///   wins the lock in between
    pub fn create(base: impl AsRef<Path>, name: &str, config: QueueConfig) -> QueueResult<Self> {
        verify_config(name, &config)?;
        let dir = QueueDir::create(base.as_ref(), name)?;
        Self::replay(dir, config)
    }

    /// Opens an existing queue directory, replaying its segments.
    ///
    /// # Errors
    ///
    /// - [`NotFound`](QueueError::NotFound) if `base/name` does not exist
    /// - [`AlreadyLocked`](QueueError::AlreadyLocked) if another process
    ///   holds the queue
    /// - [`Corrupt`](QueueError::Corrupt) if a segment fails replay
    pub fn load(base: impl AsRef<Path>, name: &str, config: QueueConfig) -> QueueResult<Self> {
        verify_config(name, &config)?;
        let dir = QueueDir::load(base.as_ref(), name)?;
        Self::replay(dir, config)
    }

    /// Builds the head/tail pair from the segment files on disk.
    ///
    /// Only the head and tail are opened; intermediate segments are
    /// sealed and fully packed, and are loaded lazily when they become
    /// head.
    fn replay(dir: QueueDir, config: QueueConfig) -> QueueResult<Self> {
        let capacity = config.segment_capacity;
        let mode = config.mode;

        let (head, tail) = match dir.segment_range()? {
            None => {
                let seg = Arc::new(Segment::create(dir.segment_path(1), capacity, 1, mode)?);
                dir.sync()?;
                (Arc::clone(&seg), seg)
            }
            Some((min, max)) => {
                let head = Arc::new(Segment::load(dir.segment_path(min), capacity, min, mode)?);
                let tail = if min == max {
                    Arc::clone(&head)
                } else {
                    Arc::new(Segment::load(dir.segment_path(max), capacity, max, mode)?)
                };
                (head, tail)
            }
        };

        debug!(
            path = %dir.path().display(),
            head = head.sequence(),
            tail = tail.sequence(),
            "opened queue"
        );

        Ok(Self {
            state: Mutex::new(State {
                dir,
                head,
                tail,
                closed: false,
            }),
            not_empty: Condvar::new(),
            segment_capacity: capacity,
            mode,
        })
    }

    /// Appends one record at the tail, rolling over first if the tail is
    /// full.
    pub fn enqueue(&self, value: T) -> QueueResult<()> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        if state.tail.size_on_disk() >= self.segment_capacity {
            self.roll_over(&mut state)?;
        }
        state.tail.enqueue(value)?;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends records in order, splitting them into chunks that pack
    /// each sealed segment to exactly `segment_capacity` record frames.
    pub fn enqueue_batch(&self, values: Vec<T>) -> QueueResult<()> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        let mut values = values;
        while !values.is_empty() {
            let used = state.tail.size_on_disk();
            if used >= self.segment_capacity {
                self.roll_over(&mut state)?;
                continue;
            }
            let take = (self.segment_capacity - used).min(values.len());
            let chunk: Vec<T> = values.drain(..take).collect();
            state.tail.enqueue_batch(chunk)?;
        }

        self.not_empty.notify_all();
        Ok(())
    }

    /// Removes and returns the head record.
    ///
    /// # Errors
    ///
    /// Returns [`Empty`](QueueError::Empty) if the queue holds no
    /// records.
    pub fn dequeue(&self) -> QueueResult<T> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        self.dequeue_locked(&mut state)
    }

    /// Removes and returns the head record, waiting for one if the queue
    /// is empty.
    ///
    /// Producers wake one waiter per enqueue; [`close`](Self::close)
    /// wakes all waiters, which then return
    /// [`AlreadyClosed`](QueueError::AlreadyClosed).
    pub fn dequeue_blocking(&self) -> QueueResult<T> {
        let mut state = self.state.lock();
        loop {
            self.ensure_open(&state)?;
            match self.dequeue_locked(&mut state) {
                Err(QueueError::Empty) => self.not_empty.wait(&mut state),
                result => return result,
            }
        }
    }

    /// Removes and returns up to `count` records in FIFO order,
    /// crossing segment boundaries and reclaiming consumed head segments
    /// along the way.
    ///
    /// # Errors
    ///
    /// Returns [`Empty`](QueueError::Empty) only if the queue is
    /// logically empty when called.
    pub fn dequeue_batch(&self, count: usize) -> QueueResult<Vec<T>> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        if logical_size(&state, self.segment_capacity) == 0 {
            return Err(QueueError::Empty);
        }

        let mut result = Vec::new();
        while result.len() < count {
            match state.head.dequeue_batch(count - result.len()) {
                Ok(mut batch) => result.append(&mut batch),
                Err(QueueError::Empty) => {}
                Err(err) => return Err(err),
            }

            if state.head.size() > 0 {
                // count satisfied; the loop condition ends it.
                continue;
            }
            if state.head.size_on_disk() >= self.segment_capacity {
                self.reclaim_head(&mut state)?;
            } else {
                // The head is the partially filled tail: drained.
                break;
            }
        }
        Ok(result)
    }

    /// Records enqueued but not yet dequeued, across all segments.
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        if state.closed {
            return 0;
        }
        logical_size(&state, self.segment_capacity)
    }

    /// A queue on disk is effectively unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::MAX
    }

    /// Removes every record and segment, restarting with a fresh tail.
    ///
    /// Sequence numbers keep growing monotonically across a clear: the
    /// fresh segment is numbered `tail.sequence + 1`.
    pub fn clear(&self) -> QueueResult<()> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        let head_seq = state.head.sequence();
        let tail_seq = state.tail.sequence();

        state.head.delete()?;
        if head_seq != tail_seq {
            state.tail.delete()?;
        }
        // Sealed intermediates were never loaded; remove their files.
        for seq in head_seq + 1..tail_seq {
            fs::remove_file(state.dir.segment_path(seq))?;
        }

        let seq = tail_seq + 1;
        let seg = Arc::new(Segment::create(
            state.dir.segment_path(seq),
            self.segment_capacity,
            seq,
            self.mode,
        )?);
        state.dir.sync()?;
        state.head = Arc::clone(&seg);
        state.tail = seg;
        debug!(sequence = seq, "cleared queue");
        Ok(())
    }

    /// Fsyncs the open segments regardless of the durability mode.
    ///
    /// In `Lazy` mode this is the explicit durability point.
    pub fn flush(&self) -> QueueResult<()> {
        let state = self.state.lock();
        self.ensure_open(&state)?;

        state.head.flush()?;
        if state.head.sequence() != state.tail.sequence() {
            state.tail.flush()?;
        }
        Ok(())
    }

    /// Releases the lock file, wakes blocked consumers, and closes the
    /// open segments. Segment files stay on disk for a later
    /// [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyClosed`](QueueError::AlreadyClosed) on a second
    /// call.
    pub fn close(&self) -> QueueResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::AlreadyClosed);
        }

        state.dir.release()?;
        state.closed = true;
        self.not_empty.notify_all();

        state.head.close()?;
        if state.head.sequence() != state.tail.sequence() {
            state.tail.close()?;
        }
        debug!(path = %state.dir.path().display(), "closed queue");
        Ok(())
    }

    /// Snapshot of the queue's segment layout and size.
    pub fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock();
        self.ensure_open(&state)?;

        Ok(QueueStats {
            size: logical_size(&state, self.segment_capacity),
            head_sequence: state.head.sequence(),
            tail_sequence: state.tail.sequence(),
            segment_count: state.tail.sequence() - state.head.sequence() + 1,
        })
    }

    fn ensure_open(&self, state: &State<T>) -> QueueResult<()> {
        if state.closed {
            return Err(QueueError::AlreadyClosed);
        }
        Ok(())
    }

    /// Seals the current tail and starts a new one at the next sequence.
    fn roll_over(&self, state: &mut State<T>) -> QueueResult<()> {
        let sequence = state.tail.sequence() + 1;
        let seg = Segment::create(
            state.dir.segment_path(sequence),
            self.segment_capacity,
            sequence,
            self.mode,
        )?;
        state.dir.sync()?;

        // The head keeps its handle; any other outgoing tail is sealed.
        if state.head.sequence() != state.tail.sequence() {
            state.tail.close()?;
        }
        state.tail = Arc::new(seg);
        debug!(sequence, "rolled over to new tail segment");
        Ok(())
    }

    fn dequeue_locked(&self, state: &mut State<T>) -> QueueResult<T> {
        let value = state.head.dequeue()?;

        if state.head.size() == 0 && state.head.size_on_disk() >= self.segment_capacity {
            self.reclaim_head(&mut *state)?;
        }
        Ok(value)
    }

    /// Deletes the fully consumed head segment and advances the head
    /// pointer: to a fresh segment when head and tail coincide, to the
    /// tail itself when adjacent, otherwise by loading the next sealed
    /// segment from disk.
    fn reclaim_head(&self, state: &mut State<T>) -> QueueResult<()> {
        let head_seq = state.head.sequence();
        let tail_seq = state.tail.sequence();

        state.head.delete()?;
        state.dir.sync()?;

        if head_seq == tail_seq {
            let sequence = tail_seq + 1;
            let seg = Arc::new(Segment::create(
                state.dir.segment_path(sequence),
                self.segment_capacity,
                sequence,
                self.mode,
            )?);
            state.dir.sync()?;
            state.head = Arc::clone(&seg);
            state.tail = seg;
        } else if head_seq + 1 == tail_seq {
            state.head = Arc::clone(&state.tail);
        } else {
            let sequence = head_seq + 1;
            state.head = Arc::new(Segment::load(
                state.dir.segment_path(sequence),
                self.segment_capacity,
                sequence,
                self.mode,
            )?);
        }
        debug!(
            reclaimed = head_seq,
            head = state.head.sequence(),
            "reclaimed consumed head segment"
        );
        Ok(())
    }
}

/// The size identity: exact because sealed intermediates are fully
/// packed.
fn logical_size<T>(state: &State<T>, segment_capacity: usize) -> usize {
    let head_seq = state.head.sequence();
    let tail_seq = state.tail.sequence();
    if head_seq == tail_seq {
        return state.head.size();
    }

    let sealed = (tail_seq - head_seq - 1) as usize;
    state.head.size() + sealed * segment_capacity + state.tail.size()
}

fn verify_config(name: &str, config: &QueueConfig) -> QueueResult<()> {
    if name.is_empty() {
        return Err(QueueError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "queue name must not be empty",
        )));
    }
    if config.segment_capacity == 0 {
        return Err(QueueError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "segment capacity must be greater than zero",
        )));
    }
    Ok(())
}

impl<T: Encode + Decode> Queue<T> for DiskQueue<T> {
    fn enqueue(&mut self, value: T) -> QueueResult<()> {
        DiskQueue::enqueue(self, value)
    }

    fn enqueue_batch(&mut self, values: Vec<T>) -> QueueResult<()> {
        DiskQueue::enqueue_batch(self, values)
    }

    fn dequeue(&mut self) -> QueueResult<T> {
        DiskQueue::dequeue(self)
    }

    fn dequeue_batch(&mut self, count: usize) -> QueueResult<Vec<T>> {
        DiskQueue::dequeue_batch(self, count)
    }

    fn size(&self) -> usize {
        DiskQueue::size(self)
    }

    fn capacity(&self) -> usize {
        DiskQueue::capacity(self)
    }

    fn clear(&mut self) {
        // The uniform contract has no error channel here; clearing a
        // closed queue is a no-op.
        let _ = DiskQueue::clear(self);
    }

    fn close(&mut self) -> QueueResult<()> {
        DiskQueue::close(self)
    }
}
