//! Runtime for handling inbound messages
//!
//! Wraps the pure state machine with persistence, per-user serialization,
//! collaborator calls and command execution.

mod executor;
mod locks;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationRuntime, RuntimeError, RuntimeSettings, TurnOutcome};
pub use locks::KeyedLocks;
pub use traits::{BookingLedger, ProfileStore};
