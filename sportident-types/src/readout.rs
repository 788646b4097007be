//! Completed card readouts

use chrono::{DateTime, Utc};

use crate::punch::Punch;
use crate::time::{to_datetime, Timestamp};

/// Card hardware generation
///
/// SI8 and later share one memory layout and are told apart by a series
/// nibble stored on the card itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardSeries {
    Si5,
    Si6,
    /// SI6 with extended 192 punch memory
    Si6Star,
    Si8,
    Si9,
    /// SI10, SI11 and SIAC
    Si10Plus,
    PCard,
    Unknown,
}

impl CardSeries {
    /// Series name as printed by SPORTident software
    pub fn name(self) -> &'static str {
        match self {
            Self::Si5 => "SiCard 5",
            Self::Si6 => "SiCard 6",
            Self::Si6Star => "SiCard 6*",
            Self::Si8 => "SiCard 8",
            Self::Si9 => "SiCard 9",
            Self::Si10Plus => "SiCard 10/11/SIAC",
            Self::PCard => "pCard",
            Self::Unknown => "Unknown",
        }
    }
}

/// Result of reading one card
///
/// Created once per card insertion and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub series: CardSeries,
    pub card_number: String,
    pub check: Timestamp,
    pub start: Timestamp,
    pub finish: Timestamp,
    /// Punches in the order they were recorded on the card
    pub punches: Vec<Punch>,
}

impl Readout {
    /// Card series name, e.g. `"SiCard 5"`
    pub fn card_series(&self) -> &'static str {
        self.series.name()
    }

    pub fn punch_count(&self) -> usize {
        self.punches.len()
    }

    pub fn check_time(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.check)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.start)
    }

    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.finish)
    }

    /// Running time in milliseconds, when both start and finish are known
    pub fn elapsed_ms(&self) -> Option<i64> {
        Some(self.finish? - self.start?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn readout(start: Timestamp, finish: Timestamp) -> Readout {
        Readout {
            series: CardSeries::Si8,
            card_number: "2003456".into(),
            check: None,
            start,
            finish,
            punches: vec![Punch::new(31, Some(1_000)), Punch::untimed(32)],
        }
    }

    #[test]
    fn test_series_names() {
        assert_eq!(CardSeries::Si5.name(), "SiCard 5");
        assert_eq!(CardSeries::Si6Star.name(), "SiCard 6*");
        assert_eq!(CardSeries::Si10Plus.name(), "SiCard 10/11/SIAC");
        assert_eq!(CardSeries::PCard.name(), "pCard");
    }

    #[test]
    fn test_elapsed() {
        assert_eq!(readout(Some(1_000), Some(61_000)).elapsed_ms(), Some(60_000));
        assert_eq!(readout(None, Some(61_000)).elapsed_ms(), None);
        assert_eq!(readout(Some(1_000), None).elapsed_ms(), None);
    }

    #[test]
    fn test_times() {
        let r = readout(Some(3_600_000), None);
        assert_eq!(r.start_time().unwrap().to_rfc3339(), "1970-01-01T01:00:00+00:00");
        assert!(r.finish_time().is_none());
        assert!(r.check_time().is_none());
        assert_eq!(r.punch_count(), 2);
        assert!(r.punches[0].is_timed());
        assert!(!r.punches[1].is_timed());
    }
}
