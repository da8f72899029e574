use std::{fmt, sync::Arc};

use super::{SerialNumber, TokenManager};

/// A lease on the index state as of the moment it was issued.
///
/// Cloning shares the lease. The issuing manager is notified once, when the
/// last clone is dropped or released.
#[derive(Clone)]
pub struct Token {
   inner: Arc<TokenInner>,
}

struct TokenInner {
   serial_number: SerialNumber,
   manager:       Arc<TokenManager>,
}

impl Token {
   pub(super) fn new(serial_number: SerialNumber, manager: Arc<TokenManager>) -> Self {
      Self { inner: Arc::new(TokenInner { serial_number, manager }) }
   }

   pub fn serial_number(&self) -> SerialNumber {
      self.inner.serial_number
   }

   /// Number of live handles sharing this lease.
   pub fn holders(&self) -> usize {
      Arc::strong_count(&self.inner)
   }

   /// Gives up this handle. Equivalent to dropping it.
   pub fn release(self) {
      drop(self);
   }
}

impl Drop for TokenInner {
   fn drop(&mut self) {
      self.manager.on_token_complete(self.serial_number);
   }
}

impl fmt::Debug for Token {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Token")
         .field("serial_number", &self.serial_number())
         .field("holders", &self.holders())
         .finish()
   }
}
