use std::sync::Arc;

use super::ChunkManifestIngestor;
use crate::{
   Result,
   task::{DistributorOptions, TaskDistributor, TaskProcessor},
};

/// Ingests every chunk of a manifest in parallel.
///
/// Construction starts ingestion on `thread_count` worker threads, one
/// processor per thread, each forwarding task ids to
/// [`ChunkManifestIngestor::ingest`]. The enumerator itself holds no index
/// state.
pub struct ChunkEnumerator {
   distributor: TaskDistributor,
}

impl ChunkEnumerator {
   pub fn new(manifest: Arc<dyn ChunkManifestIngestor>, thread_count: usize) -> Result<Self> {
      let options = DistributorOptions { thread_name: "chunk".to_string(), stack_size: None };
      Self::with_options(manifest, thread_count, &options)
   }

   pub fn with_options(
      manifest: Arc<dyn ChunkManifestIngestor>,
      thread_count: usize,
      options: &DistributorOptions,
   ) -> Result<Self> {
      let thread_count = thread_count.max(1);
      let chunk_count = manifest.len();
      tracing::info!(chunk_count, thread_count, "ingesting chunks");

      let processors = (0..thread_count)
         .map(|_| {
            Box::new(ChunkTaskProcessor { manifest: Arc::clone(&manifest), ingested: 0 })
               as Box<dyn TaskProcessor>
         })
         .collect();
      let distributor = TaskDistributor::with_options(processors, chunk_count, options)?;

      Ok(Self { distributor })
   }

   pub fn chunk_count(&self) -> usize {
      self.distributor.task_count()
   }

   /// Chunks processed so far, including failed ones.
   pub fn processed_chunks(&self) -> usize {
      self.distributor.completed_tasks()
   }

   pub fn is_complete(&self) -> bool {
      self.distributor.is_complete()
   }

   /// Blocks until every chunk has been processed and every worker has
   /// finished. Chunks that failed are reported together as
   /// [`Error::TasksFailed`](crate::Error::TasksFailed).
   pub fn wait_for_completion(&self) -> Result<()> {
      let result = self.distributor.wait_for_completion();
      match &result {
         Ok(()) => tracing::info!(chunk_count = self.chunk_count(), "chunk ingestion complete"),
         Err(e) => tracing::warn!("chunk ingestion finished with errors: {e}"),
      }
      result
   }
}

struct ChunkTaskProcessor {
   manifest: Arc<dyn ChunkManifestIngestor>,
   ingested: usize,
}

impl TaskProcessor for ChunkTaskProcessor {
   fn process_task(&mut self, task_id: usize) -> Result<()> {
      self.manifest.ingest(task_id)?;
      self.ingested += 1;
      Ok(())
   }

   fn finished(&mut self) {
      tracing::debug!(ingested = self.ingested, "chunk processor finished");
   }
}
