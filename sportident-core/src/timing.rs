//! Resolution of on-card clock values to absolute timestamps
//!
//! Stations store time of day on a bounded clock: SI5 keeps 12 hours with no
//! AM/PM information, later cards keep 12 hours plus an AM/PM bit. Absolute
//! times are recovered by chasing a reference forward: each value is pushed
//! forward by whole clock turns until it is no earlier than one hour before
//! the previous resolved time. The hour of slack absorbs drifting station
//! clocks and stations left on a different daylight-saving setting.

use sportident_types::time::{Timestamp, NO_TIME, ONE_DAY, TWELVE_HOURS};

/// Raw value of an empty time field (0xEEEE seconds)
pub const NO_SI_TIME: i64 = 1000 * 0xEEEE;

/// How far before the reference a resolved time may fall
pub const DRIFT_TOLERANCE: i64 = 3600 * 1000;

/// On-card clock model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// 12 hour word without AM/PM (SI5)
    TwelveHour,
    /// 12 hour word plus AM/PM bit, resolved to 24 hours (SI6 and later)
    FullDay,
}

impl Clock {
    /// Length of one clock turn in milliseconds
    pub fn step(self) -> i64 {
        match self {
            Self::TwelveHour => TWELVE_HOURS,
            Self::FullDay => ONE_DAY,
        }
    }

    pub fn advance_time_past(self, raw: i64, reference: Timestamp) -> Timestamp {
        advance_time_past(raw, reference, self.step())
    }
}

/// Advance a raw clock value by whole `step`s until it is at most one hour
/// before `reference`
///
/// Empty fields stay empty. Without a reference the raw value is returned as
/// is and becomes the next anchor.
pub fn advance_time_past(raw: i64, reference: Timestamp, step: i64) -> Timestamp {
    if raw == NO_SI_TIME {
        return NO_TIME;
    }
    let Some(reference) = reference else {
        return Some(raw);
    };

    let base = reference.saturating_sub(DRIFT_TOLERANCE);
    if raw >= base {
        return Some(raw);
    }

    // raw + ceil(gap / step) * step, saturating at the ends of the i64 range
    let gap = base.saturating_sub(raw);
    let rest = match gap % step {
        0 => 0,
        rem => step - rem,
    };
    Some(base.saturating_add(rest))
}

/// Next chase reference: a punch without time keeps the previous one
pub fn new_ref_time(reference: Timestamp, candidate: Timestamp) -> Timestamp {
    candidate.or(reference)
}

/// Combine an AM/PM flag and a 12 hour time, keeping empty fields empty
pub fn full_time(pm: bool, twelve_hour_time: i64) -> i64 {
    if twelve_hour_time == NO_SI_TIME {
        return NO_SI_TIME;
    }
    if pm {
        TWELVE_HOURS + twelve_hour_time
    } else {
        twelve_hour_time
    }
}
