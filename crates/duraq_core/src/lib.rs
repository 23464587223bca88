//! # DuraQ Core
//!
//! An embedded, durable, single-process FIFO queue.
//!
//! Records are appended by producers, persisted to local disk, and
//! consumed by workers in first-in-first-out order. The engine is built
//! from four pieces:
//!
//! - [`RingDeque`]: a power-of-two circular buffer with doubling growth;
//!   the reference in-memory queue and every segment's live mirror
//! - Segment: one append-only file plus its mirror; dequeues append
//!   tombstones rather than rewriting the file
//! - [`DiskQueue`]: a locked directory of segments with head/tail
//!   pointers, roll-over, and reclamation
//! - [`Queue`]: the uniform contract both implementations share
//!
//! ## Durability
//!
//! In [`SyncMode::Durable`] every mutating operation fsyncs before
//! returning. In [`SyncMode::Lazy`] flushing is left to the OS and a
//! crash loses at most the unsynced tail of the log, which replay
//! recognises as a clean truncation. Committed prefixes survive either
//! way because frames are only interpreted after they are fully written.
//!
//! ## Example
//!
//! ```no_run
//! use duraq_core::{DiskQueue, QueueConfig, SyncMode};
//!
//! let config = QueueConfig::new()
//!     .segment_capacity(4096)
//!     .mode(SyncMode::Durable);
//!
//! let queue: DiskQueue<String> = DiskQueue::create("/var/lib/ingest", "readings", config)?;
//! queue.enqueue("temp=21.5".to_string())?;
//!
//! let record = queue.dequeue()?;
//! queue.close()?;
//! # Ok::<(), duraq_core::QueueError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod disk;
mod error;
mod queue;
mod ring;
mod segment;
mod stats;

pub use config::{QueueConfig, SyncMode};
pub use disk::DiskQueue;
pub use duraq_codec::{Decode, Encode};
pub use error::{QueueError, QueueResult};
pub use queue::Queue;
pub use ring::RingDeque;
pub use stats::QueueStats;
