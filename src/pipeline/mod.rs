//! Streaming backup pipeline.
//!
//! One lightweight task per stage, single-slot channels between stages:
//!
//! ```text
//! +-----------+    +------------+    +----------+    +----------+
//! | pod exec  | -> | compressor | -> | [cipher] | -> |  upload  |
//! +-----------+    +------------+    +----------+    +----------+
//! ```
//!
//! Bytes traverse the chain in write order; the bounded channels make
//! backpressure automatic and endpoint drops propagate shutdown in both
//! directions. See [`job::run`] for the composition and error policy.

pub mod channel;
pub mod cipher;
pub mod compress;
pub mod job;

pub use channel::{chunk_channel, ChunkReceiver, ChunkSender, EXEC_CHUNK_SIZE, PIPE_CHANNEL_SIZE};
pub use job::{BackupJob, DumpSource, JobState, ObjectSink};
