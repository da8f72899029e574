use std::{fmt, io, path::PathBuf, sync::Arc};

use thiserror::Error;

/// Main error type for idxsync.
///
/// Construction-time resource failures (allocation, thread spawn) and
/// per-chunk ingestion failures both surface through this enum. Invariant
/// violations inside the synchronization primitives are asserted instead.
#[derive(Debug, Error)]
pub enum Error {
   /// Shared error, handed to more than one observer.
   #[error(transparent)]
   Shared(#[from] Arc<Self>),

   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// The token manager has begun shutting down and issues no new tokens.
   #[error("token manager is shutting down")]
   ShuttingDown,

   /// A distributor was asked to run tasks with no worker to run them.
   #[error("no workers available for {0} tasks")]
   NoWorkers(usize),

   /// Failed to spawn a worker thread.
   #[error("failed to spawn worker thread {index}: {source}")]
   ThreadSpawn {
      index:  usize,
      #[source]
      source: io::Error,
   },

   /// One or more tasks failed; every failure is reported.
   #[error("{} of {total} tasks failed: {}", .failures.len(), FailureList(.failures))]
   TasksFailed { total: usize, failures: Vec<TaskFailure> },

   /// A task panicked instead of returning an error.
   #[error("task panicked: {0}")]
   TaskPanicked(String),

   /// Chunk index outside the manifest.
   #[error("chunk index {index} out of range for manifest of {len} chunks")]
   ChunkIndex { index: usize, len: usize },

   /// Failed to read a chunk file.
   #[error("failed to read chunk {}: {source}", .path.display())]
   ChunkRead {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// The ingestor rejected a chunk.
   #[error("failed to ingest chunk {}: {reason}", .path.display())]
   Ingest { path: PathBuf, reason: String },

   /// A chunk writer was used after `complete`.
   #[error("chunk writer already completed")]
   WriterClosed,

   /// Requested alignment is not a power of two or exceeds the page size.
   #[error("invalid alignment {alignment} (page size {page_size})")]
   InvalidAlignment { alignment: usize, page_size: usize },

   /// The OS refused to provide memory.
   #[error("failed to allocate {size} bytes: {source}")]
   Alloc {
      size:   usize,
      #[source]
      source: io::Error,
   },
}

impl Error {
   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Shared(inner) => inner.exit_code(),
         Self::TasksFailed { .. } | Self::TaskPanicked(_) => 2,
         Self::Config(_) => 3,
         Self::ShuttingDown => 4,
         _ => 1,
      }
   }

   /// Failures carried by [`Error::TasksFailed`], empty for any other variant.
   pub fn task_failures(&self) -> &[TaskFailure] {
      match self {
         Self::TasksFailed { failures, .. } => failures,
         Self::Shared(inner) => inner.task_failures(),
         _ => &[],
      }
   }
}

/// A single task that did not complete successfully.
#[derive(Debug, Clone)]
pub struct TaskFailure {
   pub task_id: usize,
   pub error:   Arc<Error>,
}

impl fmt::Display for TaskFailure {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "task {}: {}", self.task_id, self.error)
   }
}

struct FailureList<'a>(&'a [TaskFailure]);

impl fmt::Display for FailureList<'_> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      for (i, failure) in self.0.iter().enumerate() {
         if i > 0 {
            f.write_str("; ")?;
         }
         write!(f, "{failure}")?;
      }
      Ok(())
   }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Config could not be parsed or merged.
   #[error("invalid config: {0}")]
   Invalid(String),

   /// Failed to serialize config for display or on-disk defaults.
   #[error("failed to serialize config: {0}")]
   Serialize(#[from] toml::ser::Error),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
