//! Time-windowed event buffers.
//!
//! A [`TimeWindow`] remembers what happened during the last `duration` and
//! forgets everything older. Producers append with [`TimeWindow::add_event`];
//! consumers read with [`TimeWindow::events`], which evicts expired entries
//! from the front as a side effect. Memory is therefore bounded by arrival
//! rate times window duration, as long as someone reads.
//!
//! Time comes from a [`Clock`]. Production code uses [`SystemClock`]; tests
//! drive a [`ManualClock`] so boundary ages are exact.

mod clock;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use window::{Event, TimeWindow};
