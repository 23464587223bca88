//! Queue statistics.

/// A point-in-time snapshot of a durable queue.
///
/// Produced by [`DiskQueue::stats`](crate::DiskQueue::stats). The numbers
/// are consistent with each other (taken under the directory lock) but
/// stale as soon as they are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Records enqueued but not yet dequeued.
    pub size: usize,
    /// Sequence number of the head (oldest live) segment.
    pub head_sequence: u64,
    /// Sequence number of the tail (currently appended) segment.
    pub tail_sequence: u64,
    /// Number of segment files on disk, head through tail inclusive.
    pub segment_count: u64,
}
