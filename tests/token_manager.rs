use std::{
   collections::HashSet,
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   thread,
   time::Duration,
};

use idxsync::{Error, TokenManager};
use parking_lot::Mutex;

#[test]
fn serials_are_unique_across_threads() {
   let manager = TokenManager::new();
   let seen = Arc::new(Mutex::new(HashSet::new()));

   let handles: Vec<_> = (0..8)
      .map(|_| {
         let manager = Arc::clone(&manager);
         let seen = Arc::clone(&seen);
         thread::spawn(move || {
            for _ in 0..500 {
               let token = manager.issue_token().expect("token");
               assert!(seen.lock().insert(token.serial_number()));
            }
         })
      })
      .collect();

   for handle in handles {
      handle.join().expect("issuer");
   }
   assert_eq!(seen.lock().len(), 4_000);
   assert_eq!(manager.next_serial_number(), 4_000);
   assert_eq!(manager.in_flight_count(), 0);
}

#[test]
fn trackers_started_under_load_all_complete() {
   let manager = TokenManager::new();
   let running = Arc::new(AtomicBool::new(true));

   let workers: Vec<_> = (0..6)
      .map(|i| {
         let manager = Arc::clone(&manager);
         let running = Arc::clone(&running);
         thread::spawn(move || {
            let mut held = Vec::new();
            while running.load(Ordering::Relaxed) {
               held.push(manager.issue_token().expect("token"));
               if held.len() > 1 + i % 3 {
                  held.remove(0);
               }
            }
         })
      })
      .collect();

   let mut trackers = Vec::new();
   for _ in 0..50 {
      trackers.push(manager.start_tracker());
      thread::sleep(Duration::from_micros(200));
   }
   running.store(false, Ordering::Relaxed);
   for worker in workers {
      worker.join().expect("worker");
   }

   for tracker in &trackers {
      tracker.wait_for_completion();
   }
   for pair in trackers.windows(2) {
      assert!(pair[0].cutoff_serial_number() <= pair[1].cutoff_serial_number());
   }
   assert_eq!(manager.in_flight_count(), 0);
   assert_eq!(manager.tracker_count(), 0);
}

#[test]
fn shutdown_waits_for_outstanding_tokens() {
   let manager = TokenManager::new();
   let token = manager.issue_token().expect("token");
   let released = Arc::new(AtomicBool::new(false));

   let holder = {
      let released = Arc::clone(&released);
      thread::spawn(move || {
         thread::sleep(Duration::from_millis(50));
         released.store(true, Ordering::SeqCst);
         drop(token);
      })
   };

   manager.shutdown();
   assert!(released.load(Ordering::SeqCst));
   assert_eq!(manager.in_flight_count(), 0);
   assert!(matches!(manager.issue_token(), Err(Error::ShuttingDown)));
   holder.join().expect("holder");
}

#[test]
fn oldest_in_flight_tracks_release_order() {
   let manager = TokenManager::new();
   let a = manager.issue_token().expect("token");
   let b = manager.issue_token().expect("token");
   let c = manager.issue_token().expect("token");

   assert_eq!(manager.oldest_in_flight(), Some(0));
   drop(b);
   assert_eq!(manager.oldest_in_flight(), Some(0));
   drop(a);
   assert_eq!(manager.oldest_in_flight(), Some(2));
   drop(c);
   assert_eq!(manager.oldest_in_flight(), None);
}
