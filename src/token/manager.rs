//! Token issuance and release fan-out.

use std::{
   collections::BTreeSet,
   sync::{Arc, Weak},
};

use parking_lot::Mutex;

use super::{SerialNumber, Token, TokenTracker};
use crate::{Error, Result};

#[derive(Default)]
struct State {
   next_serial_number: SerialNumber,
   in_flight:          BTreeSet<SerialNumber>,
   trackers:           Vec<Weak<TokenTracker>>,
   shutting_down:      bool,
}

/// Issues tokens and reports their release to registered trackers.
///
/// Issuance, release fan-out and tracker creation are serialized by one lock,
/// so a tracker is always seeded with the exact in-flight count below its
/// cutoff and sees every release that follows.
#[derive(Default)]
pub struct TokenManager {
   state: Mutex<State>,
}

impl TokenManager {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   /// Issues a token with the next serial number.
   pub fn issue_token(self: &Arc<Self>) -> Result<Token> {
      let mut state = self.state.lock();
      if state.shutting_down {
         return Err(Error::ShuttingDown);
      }
      let serial_number = state.next_serial_number;
      state.next_serial_number += 1;
      state.in_flight.insert(serial_number);
      drop(state);

      Ok(Token::new(serial_number, Arc::clone(self)))
   }

   /// Starts a tracker whose cutoff is the next serial number to be issued,
   /// i.e. one that completes once every token issued so far is released.
   pub fn start_tracker(&self) -> Arc<TokenTracker> {
      let mut state = self.state.lock();
      let cutoff = state.next_serial_number;
      Self::register(&mut state, cutoff)
   }

   /// Starts a tracker for tokens issued before `cutoff`. Cutoffs past the
   /// next serial number are clamped to it.
   pub fn start_tracker_before(&self, cutoff: SerialNumber) -> Arc<TokenTracker> {
      let mut state = self.state.lock();
      let cutoff = cutoff.min(state.next_serial_number);
      Self::register(&mut state, cutoff)
   }

   fn register(state: &mut State, cutoff: SerialNumber) -> Arc<TokenTracker> {
      let remaining = state.in_flight.range(..cutoff).count();
      let tracker = Arc::new(TokenTracker::new(cutoff, remaining));
      if remaining > 0 {
         state.trackers.retain(|t| t.strong_count() > 0);
         state.trackers.push(Arc::downgrade(&tracker));
      }
      tracing::debug!(cutoff, remaining, "started token tracker");
      tracker
   }

   /// Called exactly once per token, when its last handle goes away.
   pub(super) fn on_token_complete(&self, serial_number: SerialNumber) {
      let mut state = self.state.lock();
      let removed = state.in_flight.remove(&serial_number);
      debug_assert!(removed, "token {serial_number} released twice");

      state.trackers.retain(|weak| match weak.upgrade() {
         Some(tracker) => !tracker.on_token_complete(serial_number),
         None => false,
      });
   }

   /// Stops issuing tokens and blocks until every outstanding token has been
   /// released. Never returns if the calling thread itself holds a token.
   pub fn shutdown(&self) {
      let tracker = {
         let mut state = self.state.lock();
         state.shutting_down = true;
         let cutoff = state.next_serial_number;
         Self::register(&mut state, cutoff)
      };
      tracing::debug!(remaining = tracker.remaining_token_count(), "token manager shutting down");
      tracker.wait_for_completion();
   }

   pub fn is_shutting_down(&self) -> bool {
      self.state.lock().shutting_down
   }

   pub fn next_serial_number(&self) -> SerialNumber {
      self.state.lock().next_serial_number
   }

   pub fn in_flight_count(&self) -> usize {
      self.state.lock().in_flight.len()
   }

   /// Serial number of the oldest token still in flight.
   pub fn oldest_in_flight(&self) -> Option<SerialNumber> {
      self.state.lock().in_flight.first().copied()
   }

   /// Number of trackers still registered for notifications.
   pub fn tracker_count(&self) -> usize {
      let state = self.state.lock();
      state.trackers.iter().filter(|t| t.strong_count() > 0).count()
   }
}
