//! Index leases ("tokens") and the trackers that wait for them.
//!
//! Every holder of index state takes a [`Token`] from the [`TokenManager`].
//! Maintenance work that must not run while older readers or writers are
//! still active asks the manager for a [`TokenTracker`] and waits on it.

mod lease;
mod manager;
mod tracker;

pub use lease::Token;
pub use manager::TokenManager;
pub use tracker::TokenTracker;

/// Position of a token in issuance order. Unique and strictly increasing per
/// manager, starting at zero.
pub type SerialNumber = u64;
