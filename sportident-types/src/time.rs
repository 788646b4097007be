//! Timestamp conventions shared by every crate
//!
//! All times are milliseconds since the Unix epoch, expressed in the same
//! timezone as the zero hour the readout was resolved against. A missing
//! time is `None` rather than a magic number.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Millisecond timestamp, `None` when the card recorded no time
pub type Timestamp = Option<i64>;

/// Sentinel for "no valid timestamp"
pub const NO_TIME: Timestamp = None;

/// Milliseconds in twelve hours (one turn of the station clock)
pub const TWELVE_HOURS: i64 = 12 * 3600 * 1000;

/// Milliseconds in a day
pub const ONE_DAY: i64 = 2 * TWELVE_HOURS;

/// Local midnight of the current day, in epoch milliseconds
///
/// This is the default zero hour: card times are then resolved as wall
/// clock times of today.
pub fn start_of_today() -> i64 {
    let today = Local::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.timestamp_millis())
        .unwrap_or_default()
}

/// Convert a resolved timestamp to a UTC date-time
pub fn to_datetime(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    timestamp.and_then(DateTime::from_timestamp_millis)
}
