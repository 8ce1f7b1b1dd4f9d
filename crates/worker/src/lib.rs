//! Shared task primitives for the function host.
//!
//! Every task the host spawns goes through this crate so it carries a
//! [`TaskClass`] in its trace output and lands on the active Tokio runtime
//! (or a small fallback runtime when called from outside one).

mod class;
mod join_set;
mod spawn;
mod token;

pub use class::TaskClass;
pub use join_set::WorkerJoinSet;
pub use spawn::{spawn, spawn_blocking};
pub use token::GenerationClock;
