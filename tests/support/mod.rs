#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   collections::HashSet,
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
   thread::{self, ThreadId},
   time::Duration,
};

use idxsync::{ChunkManifestIngestor, Error, Result, TokenManager};
use parking_lot::Mutex;

/// Manifest of `len` synthetic chunks that counts how often each is ingested.
pub struct CountingManifest {
   counts:  Vec<AtomicUsize>,
   failing: HashSet<usize>,
   tokens:  Option<Arc<TokenManager>>,
   threads: Mutex<HashSet<ThreadId>>,
   delay:   Duration,
}

impl CountingManifest {
   pub fn new(len: usize) -> Self {
      Self {
         counts:  (0..len).map(|_| AtomicUsize::new(0)).collect(),
         failing: HashSet::new(),
         tokens:  None,
         threads: Mutex::new(HashSet::new()),
         delay:   Duration::ZERO,
      }
   }

   pub fn failing(mut self, index: usize) -> Self {
      self.failing.insert(index);
      self
   }

   pub fn with_tokens(mut self, tokens: Arc<TokenManager>) -> Self {
      self.tokens = Some(tokens);
      self
   }

   pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
   }

   pub fn count(&self, index: usize) -> usize {
      self.counts[index].load(Ordering::SeqCst)
   }

   pub fn total(&self) -> usize {
      self.counts.iter().map(|c| c.load(Ordering::SeqCst)).sum()
   }

   pub fn distinct_threads(&self) -> usize {
      self.threads.lock().len()
   }
}

impl ChunkManifestIngestor for CountingManifest {
   fn len(&self) -> usize {
      self.counts.len()
   }

   fn ingest(&self, index: usize) -> Result<()> {
      let _token = match &self.tokens {
         Some(tokens) => Some(tokens.issue_token()?),
         None => None,
      };
      self.threads.lock().insert(thread::current().id());
      if !self.delay.is_zero() {
         thread::sleep(self.delay);
      }
      self.counts[index].fetch_add(1, Ordering::SeqCst);
      if self.failing.contains(&index) {
         return Err(Error::Ingest {
            path:   format!("chunk-{index}").into(),
            reason: "synthetic failure".into(),
         });
      }
      Ok(())
   }
}
