//! Punch records

use crate::time::Timestamp;

/// One control-station visit recorded on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Punch {
    /// Control code (0..=1023)
    pub code: u16,

    /// Resolved punch time, `None` when the slot carries no time
    pub timestamp: Timestamp,
}

impl Punch {
    pub fn new(code: u16, timestamp: Timestamp) -> Self {
        Self { code, timestamp }
    }

    /// Punch without a recorded time
    pub fn untimed(code: u16) -> Self {
        Self {
            code,
            timestamp: None,
        }
    }

    pub fn is_timed(&self) -> bool {
        self.timestamp.is_some()
    }
}
