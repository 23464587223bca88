//! The uniform queue contract.

use crate::error::QueueResult;

/// A FIFO queue of records.
///
/// Implemented by both [`RingDeque`](crate::RingDeque) (in memory) and
/// [`DiskQueue`](crate::DiskQueue) (durable), so tests and callers can
/// substitute one for the other, and so segments can use the ring deque
/// as their in-memory mirror without a second interface.
///
/// Batch operations are first-class rather than loops over the singleton
/// forms; the durable implementation amortises its fsync cost across a
/// batch.
pub trait Queue<T> {
    /// Appends one record at the tail.
    fn enqueue(&mut self, value: T) -> QueueResult<()>;

    /// Appends records at the tail, preserving their order.
    fn enqueue_batch(&mut self, values: Vec<T>) -> QueueResult<()>;

    /// Removes and returns the record at the head.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`](crate::QueueError::Empty) if the
    /// queue holds no records.
    fn dequeue(&mut self) -> QueueResult<T>;

    /// Removes and returns up to `count` records in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`](crate::QueueError::Empty) if the
    /// queue holds no records at the time of the call.
    fn dequeue_batch(&mut self, count: usize) -> QueueResult<Vec<T>>;

    /// Number of records currently queued.
    fn size(&self) -> usize;

    /// Maximum number of records the queue can hold.
    fn capacity(&self) -> usize;

    /// Removes all records.
    fn clear(&mut self);

    /// Releases the queue's resources.
    fn close(&mut self) -> QueueResult<()>;
}
