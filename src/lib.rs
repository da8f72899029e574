//! Token tracking and parallel chunk ingestion for a document index.
//!
//! Readers and writers of index state hold [`Token`]s issued by a
//! [`TokenManager`]. Maintenance work (shard garbage collection, snapshots)
//! obtains a [`TokenTracker`] and waits until every token issued before it has
//! been released. [`ChunkEnumerator`] ingests a manifest of chunk files on a
//! pool of worker threads, each ingestion holding a token while it runs.

pub mod chunk;
pub mod config;
pub mod error;
pub mod memory;
pub mod task;
pub mod token;

pub use chunk::{ChunkEnumerator, ChunkManifestIngestor};
pub use error::{Error, Result};
pub use memory::AlignedBuffer;
pub use task::{TaskDistributor, TaskProcessor};
pub use token::{SerialNumber, Token, TokenManager, TokenTracker};
