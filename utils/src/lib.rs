//! Shared utilities for the relayer.

pub mod clock;
pub mod shuffle;
pub mod time;

pub use clock::{Clock, SystemClock};
pub use shuffle::{shuffle_with, Shuffler, ThreadRngShuffler};
pub use time::format_duration;
