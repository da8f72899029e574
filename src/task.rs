//! Fan a closed set of tasks out across worker threads.

use std::{
   any::Any,
   panic::{self, AssertUnwindSafe},
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
   thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result, error::TaskFailure};

/// Per-thread task callback.
///
/// Each worker thread owns exactly one processor, so implementations can keep
/// thread-local bookkeeping without synchronization.
pub trait TaskProcessor: Send {
   /// Processes one task. Every task id is handed to exactly one processor.
   fn process_task(&mut self, task_id: usize) -> Result<()>;

   /// Called once, after this processor's last task.
   fn finished(&mut self) {}
}

/// Thread naming and sizing for a [`TaskDistributor`].
#[derive(Debug, Clone)]
pub struct DistributorOptions {
   pub thread_name: String,
   pub stack_size:  Option<usize>,
}

impl Default for DistributorOptions {
   fn default() -> Self {
      Self { thread_name: "task".to_string(), stack_size: None }
   }
}

#[derive(Default)]
struct Progress {
   finished_threads: usize,
   failures:         Vec<TaskFailure>,
}

struct Shared {
   task_count:      usize,
   thread_count:    usize,
   next_task:       AtomicUsize,
   completed_tasks: AtomicUsize,
   progress:        Mutex<Progress>,
   all_finished:    Condvar,
}

impl Shared {
   fn claim(&self) -> Option<usize> {
      let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
      (task_id < self.task_count).then_some(task_id)
   }

   fn record_failure(&self, task_id: usize, error: Error) {
      tracing::warn!(task_id, "task failed: {error}");
      self
         .progress
         .lock()
         .failures
         .push(TaskFailure { task_id, error: Arc::new(error) });
   }
}

/// Runs tasks `0..task_count` on one thread per processor.
///
/// Work starts at construction. Task ids are claimed dynamically, so faster
/// threads take more of them. A task that fails or panics is recorded and the
/// thread moves on to its next task; failures are reported by
/// [`wait_for_completion`](Self::wait_for_completion). Dropping the distributor
/// joins its threads.
pub struct TaskDistributor {
   shared:  Arc<Shared>,
   handles: Vec<JoinHandle<()>>,
}

impl TaskDistributor {
   pub fn new(processors: Vec<Box<dyn TaskProcessor>>, task_count: usize) -> Result<Self> {
      Self::with_options(processors, task_count, &DistributorOptions::default())
   }

   pub fn with_options(
      processors: Vec<Box<dyn TaskProcessor>>,
      task_count: usize,
      options: &DistributorOptions,
   ) -> Result<Self> {
      if processors.is_empty() && task_count > 0 {
         return Err(Error::NoWorkers(task_count));
      }

      let shared = Arc::new(Shared {
         task_count,
         thread_count: processors.len(),
         next_task: AtomicUsize::new(0),
         completed_tasks: AtomicUsize::new(0),
         progress: Mutex::new(Progress::default()),
         all_finished: Condvar::new(),
      });

      let mut handles = Vec::with_capacity(processors.len());
      for (index, processor) in processors.into_iter().enumerate() {
         let mut builder = thread::Builder::new().name(format!("{}-{index}", options.thread_name));
         if let Some(stack_size) = options.stack_size {
            builder = builder.stack_size(stack_size);
         }

         let worker_shared = Arc::clone(&shared);
         match builder.spawn(move || run_worker(&worker_shared, processor)) {
            Ok(handle) => handles.push(handle),
            Err(source) => {
               // Stop handing out work and let the threads that did start drain.
               shared.next_task.store(task_count, Ordering::Relaxed);
               for handle in handles {
                  let _ = handle.join();
               }
               return Err(Error::ThreadSpawn { index, source });
            },
         }
      }

      tracing::debug!(task_count, threads = handles.len(), "task distributor started");
      Ok(Self { shared, handles })
   }

   pub fn task_count(&self) -> usize {
      self.shared.task_count
   }

   pub fn thread_count(&self) -> usize {
      self.shared.thread_count
   }

   /// Tasks that have run to completion, successfully or not.
   pub fn completed_tasks(&self) -> usize {
      self.shared.completed_tasks.load(Ordering::Acquire)
   }

   /// Whether every thread has called `finished` on its processor.
   pub fn is_complete(&self) -> bool {
      self.shared.progress.lock().finished_threads == self.shared.thread_count
   }

   /// Blocks until every thread has finished, then reports any failed tasks
   /// in task-id order.
   pub fn wait_for_completion(&self) -> Result<()> {
      let mut progress = self.shared.progress.lock();
      while progress.finished_threads < self.shared.thread_count {
         self.shared.all_finished.wait(&mut progress);
      }

      if progress.failures.is_empty() {
         return Ok(());
      }
      let mut failures = progress.failures.clone();
      failures.sort_by_key(|failure| failure.task_id);
      Err(Error::TasksFailed { total: self.shared.task_count, failures })
   }
}

impl Drop for TaskDistributor {
   fn drop(&mut self) {
      for handle in self.handles.drain(..) {
         let _ = handle.join();
      }
   }
}

/// Counts the thread as finished even if `finished` panics.
struct FinishGuard<'a>(&'a Shared);

impl Drop for FinishGuard<'_> {
   fn drop(&mut self) {
      let mut progress = self.0.progress.lock();
      progress.finished_threads += 1;
      if progress.finished_threads == self.0.thread_count {
         self.0.all_finished.notify_all();
      }
   }
}

fn run_worker(shared: &Shared, mut processor: Box<dyn TaskProcessor>) {
   let _guard = FinishGuard(shared);
   let mut processed = 0usize;

   while let Some(task_id) = shared.claim() {
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process_task(task_id)));
      match outcome {
         Ok(Ok(())) => {},
         Ok(Err(error)) => shared.record_failure(task_id, error),
         Err(payload) => {
            shared.record_failure(task_id, Error::TaskPanicked(panic_message(&*payload)));
         },
      }
      processed += 1;
      shared.completed_tasks.fetch_add(1, Ordering::AcqRel);
   }

   if panic::catch_unwind(AssertUnwindSafe(|| processor.finished())).is_err() {
      tracing::error!("task processor panicked in finished()");
   }
   drop(processor);
   tracing::debug!(
      thread = thread::current().name().unwrap_or("unnamed"),
      processed,
      "worker finished"
   );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
   if let Some(message) = payload.downcast_ref::<&str>() {
      (*message).to_string()
   } else if let Some(message) = payload.downcast_ref::<String>() {
      message.clone()
   } else {
      "non-string panic payload".to_string()
   }
}
