//! Local mirror of a TickTick account.
//!
//! Projects, tasks and notes are kept in a SQLite cache and refreshed from the
//! remote API only when a cached batch is empty, expired or incomplete. All
//! remote traffic is spaced by a shared rate limiter and retried with backoff.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod observe;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
