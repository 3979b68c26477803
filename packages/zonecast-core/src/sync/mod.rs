//! Synchronization between HTTP requests and the eventually consistent backend.
//!
//! - `poll` - Bounded-retry primitive shared by convergence waits and long-polls
//! - `long_poll` - "Block until the version moves" protocol
//! - `versions` - Per-resource version counters (written by the backend)
//! - `sessions` - Client session bookkeeping

pub mod long_poll;
pub mod poll;
pub mod sessions;
pub mod versions;

pub use long_poll::{parse_last_update_id, wait_for_change, LongPollOutcome, LongPollRequest};
pub use poll::{poll_until, PollOutcome};
pub use sessions::SessionRegistry;
pub use versions::{ResourceKey, UpdateIdRegistry};
