//! Quiescence tracking for tokens issued before a cutoff.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use super::SerialNumber;

/// Tracks the tokens issued before a cutoff serial number.
///
/// The tracker is seeded with the number of tokens below the cutoff that were
/// in flight when it was created. The token manager reports every token
/// release to every registered tracker; releases below the cutoff decrement
/// the remaining count, and the tracker is complete once it reaches zero.
///
/// Several trackers may cover overlapping ranges. Tokens can be released out
/// of issuance order, but a tracker created earlier never completes after one
/// created later, provided both were seeded by the same manager.
///
/// The seed must be read atomically with respect to token issuance. A wrong
/// seed makes the tracker either never complete or complete early; use
/// [`TokenManager::start_tracker`](super::TokenManager::start_tracker) rather
/// than constructing trackers by hand.
pub struct TokenTracker {
   cutoff_serial_number:  SerialNumber,
   remaining_token_count: AtomicUsize,
   // Serializes the wait/notify handshake only; the counter is the source of
   // truth.
   condition_lock:        Mutex<()>,
   condition:             Condvar,
}

impl TokenTracker {
   pub fn new(cutoff_serial_number: SerialNumber, remaining_token_count: usize) -> Self {
      Self {
         cutoff_serial_number,
         remaining_token_count: AtomicUsize::new(remaining_token_count),
         condition_lock: Mutex::new(()),
         condition: Condvar::new(),
      }
   }

   /// Exclusive upper bound of the serial numbers this tracker waits for.
   pub const fn cutoff_serial_number(&self) -> SerialNumber {
      self.cutoff_serial_number
   }

   pub fn remaining_token_count(&self) -> usize {
      self.remaining_token_count.load(Ordering::Acquire)
   }

   /// Records the release of the token with `serial_number`.
   ///
   /// Returns `true` when the tracker no longer needs notifications: either
   /// this call released its last token, or the serial number is outside the
   /// tracked range and the tracker is already complete. Safe to call from
   /// any number of threads at once.
   pub fn on_token_complete(&self, serial_number: SerialNumber) -> bool {
      if serial_number >= self.cutoff_serial_number {
         return self.is_complete();
      }

      let previous =
         self
            .remaining_token_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

      match previous {
         Ok(1) => {
            let _guard = self.condition_lock.lock();
            self.condition.notify_all();
            tracing::debug!(cutoff = self.cutoff_serial_number, "token tracker complete");
            true
         },
         Ok(_) => false,
         Err(_) => {
            tracing::error!(
               cutoff = self.cutoff_serial_number,
               serial_number,
               "token tracker received more completions than it was seeded with"
            );
            if cfg!(debug_assertions) {
               panic!(
                  "token tracker underflow: serial {serial_number} below cutoff {} released \
                   after completion",
                  self.cutoff_serial_number
               );
            }
            true
         },
      }
   }

   /// Non-blocking check. A `true` result never reverts.
   pub fn is_complete(&self) -> bool {
      self.remaining_token_count.load(Ordering::Acquire) == 0
   }

   /// Blocks until every tracked token has been released. Returns immediately
   /// if that has already happened.
   pub fn wait_for_completion(&self) {
      if self.is_complete() {
         return;
      }

      let mut guard = self.condition_lock.lock();
      while !self.is_complete() {
         self.condition.wait(&mut guard);
      }
   }
}

impl std::fmt::Debug for TokenTracker {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("TokenTracker")
         .field("cutoff_serial_number", &self.cutoff_serial_number)
         .field("remaining_token_count", &self.remaining_token_count())
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use std::{sync::Arc, thread, time::Duration};

   use super::*;

   #[test]
   fn zero_seed_is_complete_immediately() {
      let tracker = TokenTracker::new(10, 0);
      assert!(tracker.is_complete());
      tracker.wait_for_completion();
   }

   #[test]
   fn completes_after_last_in_range_release() {
      let tracker = TokenTracker::new(100, 3);

      assert!(!tracker.on_token_complete(40));
      assert!(!tracker.is_complete());
      assert!(!tracker.on_token_complete(99));
      assert!(!tracker.is_complete());
      assert!(tracker.on_token_complete(5));
      assert!(tracker.is_complete());

      assert!(tracker.on_token_complete(150));
      assert!(tracker.is_complete());
      assert_eq!(tracker.remaining_token_count(), 0);
   }

   #[test]
   fn out_of_range_releases_are_ignored() {
      let tracker = TokenTracker::new(10, 1);
      for serial in 10..1000 {
         assert!(!tracker.on_token_complete(serial));
      }
      assert_eq!(tracker.remaining_token_count(), 1);
      assert!(tracker.on_token_complete(9));
   }

   #[test]
   #[should_panic(expected = "token tracker underflow")]
   #[cfg(debug_assertions)]
   fn underflow_is_asserted() {
      let tracker = TokenTracker::new(10, 1);
      tracker.on_token_complete(1);
      tracker.on_token_complete(2);
   }

   #[test]
   fn waiter_is_released_by_another_thread() {
      let tracker = Arc::new(TokenTracker::new(5, 2));

      let waiters: Vec<_> = (0..4)
         .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.wait_for_completion())
         })
         .collect();

      thread::sleep(Duration::from_millis(20));
      tracker.on_token_complete(0);
      thread::sleep(Duration::from_millis(20));
      tracker.on_token_complete(4);

      for waiter in waiters {
         waiter.join().expect("waiter thread");
      }
      assert!(tracker.is_complete());
   }
}
