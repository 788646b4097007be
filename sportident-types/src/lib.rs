//! Type definitions for sportident

pub mod punch;
pub mod readout;
pub mod time;

pub use punch::Punch;
pub use readout::{CardSeries, Readout};
pub use time::{Timestamp, NO_TIME};
