//! Parallel ingestion of chunk files.

mod enumerator;
pub mod manifest;
mod writer;

pub use enumerator::ChunkEnumerator;
pub use manifest::{ChunkIngestor, FileManifest, load_manifest_file};
pub use writer::{ChunkWriter, CopyChunkWriter};

use crate::Result;

/// An ordered, fixed-size set of chunks that can be ingested by index.
///
/// `ingest` is called concurrently for distinct indices and at most once per
/// index by a [`ChunkEnumerator`]. Implementations acquire whatever tokens
/// they need for each chunk.
pub trait ChunkManifestIngestor: Send + Sync {
   fn len(&self) -> usize;

   fn is_empty(&self) -> bool {
      self.len() == 0
   }

   fn ingest(&self, index: usize) -> Result<()>;
}
