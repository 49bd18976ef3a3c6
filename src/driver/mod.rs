// src/driver/mod.rs

//! Observer side: receives status frames from many realizations and turns
//! them into an ordered queue of `Started`/`Finished` events.
//!
//! - [`handle`]: the `Driver` (socket, background poll task, event queue).
//! - [`poll_loop`]: the loop that acks frames and translates messages.
//! - [`translate`]: idempotent message → event translation.
//! - [`consumer`]: `poll`, which waits for a set of realizations.

pub mod consumer;
pub mod event;
pub mod handle;
pub mod poll_loop;
pub mod translate;

pub use consumer::{PollHooks, poll};
pub use event::Event;
pub use handle::Driver;
pub use poll_loop::PollStats;
pub use translate::{RealizationState, Translator};
