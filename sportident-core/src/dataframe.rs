//! Card memory decoding
//!
//! Every card generation stores the same information (card number, check,
//! start and finish times, punch list) at different places. Each series is
//! described by a constant [`Layout`] and decoded by one shared routine.
//!
//! Decoding never fails on card content: all fields are fixed-width reads,
//! and punch counts are clamped to what the assembled buffer can hold.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use tracing::{debug, trace};

use sportident_types::{CardSeries, Punch, Readout, Timestamp};

use crate::constants::BLOCK_SIZE;
use crate::timing::{full_time, new_ref_time, Clock};

/// Timed punch slots of an SI5 card
pub const SI5_TIMED_PUNCHES: usize = 30;

/// Untimed punch slots of an SI5 card, used once the timed ones are full
pub const SI5_UNTIMED_PUNCHES: usize = 6;

/// Size of a punch record on SI6 and later
const RECORD_SIZE: usize = 4;

/// Card family, as announced by the station when a card is inserted
///
/// Each family has its own readout command and block sequence. SI8 and later
/// are only told apart once block 0 has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardFamily {
    Si5,
    Si6,
    Si6Star,
    Si8Plus,
}

impl CardFamily {
    /// Number of blocks the decoder needs at the very least
    pub fn min_blocks(self) -> usize {
        match self {
            Self::Si5 => 1,
            Self::Si6 | Self::Si6Star => 3,
            Self::Si8Plus => 2,
        }
    }
}

/// Where the card number is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardNumberField {
    /// 16 bit number plus a series byte counting hundred thousands
    Si5 { number: usize, series: usize },
    /// 24 bit big-endian number
    Block3(usize),
}

/// Where and how punches are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchTable {
    /// Rows of five 3-byte records, see [`si5_punch_offset`]
    Si5 { count: usize },
    /// Consecutive 4-byte records starting at `base`
    Records { count: usize, base: usize },
}

/// Memory layout of one card series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub card_number: CardNumberField,
    pub check: usize,
    pub start: usize,
    pub finish: usize,
    pub punches: PunchTable,
    pub clock: Clock,
}

const SI5_LAYOUT: Layout = Layout {
    card_number: CardNumberField::Si5 {
        number: 0x04,
        series: 0x06,
    },
    check: 0x19,
    start: 0x13,
    finish: 0x15,
    punches: PunchTable::Si5 { count: 0x17 },
    clock: Clock::TwelveHour,
};

// SI6: 16 byte pages
const SI6_LAYOUT: Layout = Layout {
    card_number: CardNumberField::Block3(2 * 4 + 3),
    check: 16 + 3 * 4,
    start: 16 + 2 * 4,
    finish: 16 + 4,
    punches: PunchTable::Records {
        count: 16 + 2,
        base: 8 * 16,
    },
    clock: Clock::FullDay,
};

/// SI8 and later layout, 4 byte pages; only the punch table moves
const fn si8_plus_layout(punches_page: usize) -> Layout {
    Layout {
        card_number: CardNumberField::Block3(SI8_SERIES_INDEX + 1),
        check: 2 * 4,
        start: 3 * 4,
        finish: 4 * 4,
        punches: PunchTable::Records {
            count: 5 * 4 + 2,
            base: punches_page * 4,
        },
        clock: Clock::FullDay,
    }
}

/// Offset of the series nibble on SI8 and later
const SI8_SERIES_INDEX: usize = 6 * 4;

/// Memory layout of a card series
pub fn layout(series: CardSeries) -> Layout {
    match series {
        CardSeries::Si5 => SI5_LAYOUT,
        CardSeries::Si6 | CardSeries::Si6Star => SI6_LAYOUT,
        CardSeries::Si8 => si8_plus_layout(34),
        CardSeries::Si9 => si8_plus_layout(14),
        CardSeries::Si10Plus => si8_plus_layout(32),
        CardSeries::PCard => si8_plus_layout(44),
        CardSeries::Unknown => si8_plus_layout(0),
    }
}

/// Offset of timed punch `i` on an SI5 card
///
/// The 128 byte block is laid out in rows of 16 bytes. From row 2 on, each
/// row starts with one untimed punch code, followed by five 3-byte records
/// (code, time high, time low).
///
/// ```text
///      0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
///  0   x  CI6 CI5 CI4 CN1 CN0 CNS  0  WP  ..  ..  ..  ..  ..  ..  ..
///  1  SB1 SN1 SN0 ST1 ST0 FT1 FT0  RC SB2 CT1 CT0  SW CNS  CS  FB  LB
///  2   31 1.1 1.2 1.3 2.1 2.2 2.3 3.1 3.2 3.3 4.1 4.2 4.3 5.1 5.2 5.3
///  3   32 6.1 6.2 6.3 7.1 7.2 7.3 8.1 8.2 8.3 9.1 9.2 9.3 ...
/// ```
pub fn si5_punch_offset(i: usize) -> usize {
    0x21 + (i / 5) * 0x10 + (i % 5) * 0x03
}

/// Offset of the code of untimed SI5 punch `i`
fn si5_untimed_offset(i: usize) -> usize {
    0x20 + i * 0x10
}

/// 10 bit control code spread over the first two bytes of a punch record
pub fn record_code(b0: u8, b1: u8) -> u16 {
    (u16::from(b0 & 0xC0) << 2) | u16::from(b1)
}

/// Assembled card memory
#[derive(Debug, Clone)]
pub struct DataFrame {
    series: CardSeries,
    data: Vec<u8>,
}

impl DataFrame {
    /// Concatenate card blocks, in read order, into one buffer
    ///
    /// Blocks shorter than 128 bytes are zero-padded.
    ///
    /// # Panics
    ///
    /// Panics if fewer blocks than the family needs are given. The session
    /// only decodes complete reads, so this is a logic error.
    pub fn assemble(family: CardFamily, blocks: &[Bytes]) -> Self {
        assert!(
            blocks.len() >= family.min_blocks(),
            "{:?} readout needs {} blocks, got {}",
            family,
            family.min_blocks(),
            blocks.len()
        );

        let mut data = vec![0u8; blocks.len() * BLOCK_SIZE];
        for (page, block) in data.chunks_exact_mut(BLOCK_SIZE).zip(blocks) {
            let len = block.len().min(BLOCK_SIZE);
            page[..len].copy_from_slice(&block[..len]);
        }

        let series = match family {
            CardFamily::Si5 => CardSeries::Si5,
            CardFamily::Si6 => CardSeries::Si6,
            CardFamily::Si6Star => CardSeries::Si6Star,
            CardFamily::Si8Plus => match data[SI8_SERIES_INDEX] & 0x0F {
                2 => CardSeries::Si8,
                1 => CardSeries::Si9,
                4 => CardSeries::PCard,
                15 => CardSeries::Si10Plus,
                _ => CardSeries::Unknown,
            },
        };

        trace!(?series, len = data.len(), "Assembled data frame");

        Self { series, data }
    }

    pub fn series(&self) -> CardSeries {
        self.series
    }

    fn byte_at(&self, i: usize) -> u8 {
        self.data[i]
    }

    fn word_at(&self, i: usize) -> u16 {
        BigEndian::read_u16(&self.data[i..i + 2])
    }

    fn block3_at(&self, i: usize) -> u32 {
        BigEndian::read_u24(&self.data[i..i + 3])
    }

    fn timestamp_at(&self, i: usize) -> i64 {
        1000 * i64::from(self.word_at(i))
    }

    /// Raw clock value of a time field, per the series clock model
    fn raw_time(&self, clock: Clock, offset: usize) -> i64 {
        match clock {
            Clock::TwelveHour => self.timestamp_at(offset),
            Clock::FullDay => {
                full_time(self.byte_at(offset) & 1 == 1, self.timestamp_at(offset + 2))
            }
        }
    }

    fn card_number(&self, field: CardNumberField) -> u32 {
        match field {
            CardNumberField::Si5 { number, series } => {
                let cns = u32::from(self.byte_at(series));
                let number = u32::from(self.word_at(number));
                if cns > 1 {
                    number + cns * 100_000
                } else {
                    number
                }
            }
            CardNumberField::Block3(offset) => self.block3_at(offset),
        }
    }

    /// Resolve all times against `zero_hour` and build the readout
    pub fn readout(&self, zero_hour: i64) -> Readout {
        let layout = layout(self.series);
        let clock = layout.clock;
        let zero_hour = Some(zero_hour);

        let start = clock.advance_time_past(self.raw_time(clock, layout.start), zero_hour);
        let check = clock.advance_time_past(self.raw_time(clock, layout.check), zero_hour);

        let reference = new_ref_time(zero_hour, start);
        let (punches, reference) = self.punches(&layout, reference);

        let finish = clock.advance_time_past(self.raw_time(clock, layout.finish), reference);

        let readout = Readout {
            series: self.series,
            card_number: self.card_number(layout.card_number).to_string(),
            check,
            start,
            finish,
            punches,
        };

        debug!(
            series = readout.card_series(),
            card = %readout.card_number,
            punches = readout.punches.len(),
            "Decoded card"
        );

        readout
    }

    /// Walk the punch table in card order, chasing the reference forward
    ///
    /// Returns the punches and the reference after the last timed punch.
    fn punches(&self, layout: &Layout, mut reference: Timestamp) -> (Vec<Punch>, Timestamp) {
        let clock = layout.clock;
        let mut punches = Vec::new();

        match layout.punches {
            PunchTable::Si5 { count } => {
                let total = usize::from(self.byte_at(count))
                    .saturating_sub(1)
                    .min(SI5_TIMED_PUNCHES + SI5_UNTIMED_PUNCHES);
                let timed = total.min(SI5_TIMED_PUNCHES);

                for i in 0..timed {
                    let offset = si5_punch_offset(i);
                    let time = clock.advance_time_past(self.timestamp_at(offset + 1), reference);
                    punches.push(Punch::new(u16::from(self.byte_at(offset)), time));
                    reference = new_ref_time(reference, time);
                }
                for i in 0..total - timed {
                    let code = self.byte_at(si5_untimed_offset(i));
                    punches.push(Punch::untimed(u16::from(code)));
                }
            }
            PunchTable::Records { count, base } => {
                let capacity = self.data.len().saturating_sub(base) / RECORD_SIZE;
                let total = usize::from(self.byte_at(count)).min(capacity);

                for i in 0..total {
                    let offset = base + i * RECORD_SIZE;
                    let code = record_code(self.byte_at(offset), self.byte_at(offset + 1));
                    let time = clock.advance_time_past(self.raw_time(clock, offset), reference);
                    punches.push(Punch::new(code, time));
                    reference = new_ref_time(reference, time);
                }
            }
        }

        (punches, reference)
    }
}

/// Decode the blocks of one card into a readout
///
/// `blocks` hold card memory only, in read order; `zero_hour` anchors the
/// first time on the card.
///
/// # Panics
///
/// Panics if `blocks` is shorter than [`CardFamily::min_blocks`].
pub fn decode(family: CardFamily, blocks: &[Bytes], zero_hour: i64) -> Readout {
    DataFrame::assemble(family, blocks).readout(zero_hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sportident_types::time::{ONE_DAY, TWELVE_HOURS};

    /// 2023-11-14 00:00 UTC
    const ZERO: i64 = 19_675 * ONE_DAY;
    const EMPTY: u16 = 0xEEEE;

    fn secs(s: i64) -> i64 {
        s * 1000
    }

    fn put_word(buf: &mut [u8], i: usize, value: u16) {
        buf[i..i + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn blocks(data: &[u8]) -> Vec<Bytes> {
        data.chunks(BLOCK_SIZE).map(Bytes::copy_from_slice).collect()
    }

    #[test]
    fn test_si5_punch_offsets() {
        assert_eq!(si5_punch_offset(0), 0x21);
        assert_eq!(si5_punch_offset(1), 0x24);
        assert_eq!(si5_punch_offset(4), 0x2D);
        assert_eq!(si5_punch_offset(5), 0x31);
        // row 7, last record
        assert_eq!(si5_punch_offset(29), 0x7D);
    }

    #[test]
    fn test_record_code() {
        assert_eq!(record_code(0xC3, 0x2A), 810);
        assert_eq!(record_code(0x01, 0x1F), 31);
        assert_eq!(record_code(0x40, 0xFF), 0x1FF);
    }

    #[test]
    fn test_si5_decode() {
        let mut data = [0u8; BLOCK_SIZE];
        put_word(&mut data, 0x04, 12345);
        data[0x06] = 2;
        put_word(&mut data, 0x13, 36000);
        put_word(&mut data, 0x15, 1200);
        put_word(&mut data, 0x19, EMPTY);
        data[0x17] = 4;
        data[0x21] = 31;
        put_word(&mut data, 0x22, 36600);
        data[0x24] = 32;
        put_word(&mut data, 0x25, EMPTY);
        data[0x27] = 33;
        put_word(&mut data, 0x28, 600);

        let readout = decode(CardFamily::Si5, &blocks(&data), ZERO);

        assert_eq!(readout.series, CardSeries::Si5);
        assert_eq!(readout.card_number, "212345");
        assert_eq!(readout.check, None);
        assert_eq!(readout.start, Some(ZERO + secs(36000)));
        assert_eq!(
            readout.punches,
            vec![
                Punch::new(31, Some(ZERO + secs(36600))),
                Punch::untimed(32),
                // 00:10 on the 12 hour clock, after 10:10: past noon
                Punch::new(33, Some(ZERO + TWELVE_HOURS + secs(600))),
            ]
        );
        assert_eq!(readout.finish, Some(ZERO + TWELVE_HOURS + secs(1200)));
    }

    #[test]
    fn test_si5_untimed_overflow() {
        let mut data = [0u8; BLOCK_SIZE];
        put_word(&mut data, 0x04, 4660);
        data[0x06] = 1;
        put_word(&mut data, 0x13, EMPTY);
        put_word(&mut data, 0x15, EMPTY);
        put_word(&mut data, 0x19, EMPTY);
        data[0x17] = 34;
        for i in 0..SI5_TIMED_PUNCHES {
            let offset = si5_punch_offset(i);
            data[offset] = 31 + i as u8;
            put_word(&mut data, offset + 1, 36000 + 60 * i as u16);
        }
        for i in 0..SI5_UNTIMED_PUNCHES {
            data[0x20 + i * 0x10] = 61 + i as u8;
        }

        let readout = decode(CardFamily::Si5, &blocks(&data), ZERO);

        assert_eq!(readout.card_number, "4660");
        assert_eq!(readout.start, None);
        assert_eq!(readout.finish, None);
        assert_eq!(readout.punches.len(), 33);
        assert_eq!(readout.punches[0], Punch::new(31, Some(ZERO + secs(36000))));
        assert_eq!(readout.punches[29], Punch::new(60, Some(ZERO + secs(37740))));
        assert_eq!(
            &readout.punches[30..],
            &[Punch::untimed(61), Punch::untimed(62), Punch::untimed(63)]
        );
    }

    #[test]
    fn test_si5_empty_card() {
        let mut data = [0u8; BLOCK_SIZE];
        data[0x17] = 0;

        let readout = decode(CardFamily::Si5, &blocks(&data), ZERO);
        assert!(readout.punches.is_empty());
    }

    fn si6_card() -> Vec<u8> {
        let mut data = vec![0u8; 3 * BLOCK_SIZE];
        data[11..14].copy_from_slice(&[0x0A, 0xBC, 0xDE]);
        data[24] = 0x01;
        put_word(&mut data, 26, 3600);
        data[20] = 0x01;
        put_word(&mut data, 22, 7200);
        put_word(&mut data, 30, EMPTY);
        data[18] = 3;

        data[128] = 0x01;
        data[129] = 31;
        put_word(&mut data, 130, 4000);
        data[132] = 0xC1;
        data[133] = 0x2A;
        put_word(&mut data, 134, EMPTY);
        data[136] = 0x00;
        data[137] = 33;
        put_word(&mut data, 138, 3000);
        data
    }

    #[test]
    fn test_si6_decode() {
        let readout = decode(CardFamily::Si6, &blocks(&si6_card()), ZERO);

        assert_eq!(readout.series, CardSeries::Si6);
        assert_eq!(readout.card_number, "703710");
        assert_eq!(readout.check, None);
        assert_eq!(readout.start, Some(ZERO + TWELVE_HOURS + secs(3600)));
        assert_eq!(
            readout.punches,
            vec![
                Punch::new(31, Some(ZERO + TWELVE_HOURS + secs(4000))),
                Punch::new(810, None),
                Punch::new(33, Some(ZERO + ONE_DAY + secs(3000))),
            ]
        );
        assert_eq!(readout.finish, Some(ZERO + ONE_DAY + TWELVE_HOURS + secs(7200)));
    }

    #[test]
    fn test_si5_finish_follows_last_timed_punch() {
        let mut data = [0u8; BLOCK_SIZE];
        put_word(&mut data, 0x04, 12345);
        put_word(&mut data, 0x13, 36000);
        put_word(&mut data, 0x19, EMPTY);
        data[0x17] = 3;
        data[0x21] = 31;
        put_word(&mut data, 0x22, 40000);
        data[0x24] = 32;
        put_word(&mut data, 0x25, EMPTY);
        // 00:20 on the 12 hour clock
        put_word(&mut data, 0x15, 1200);

        let readout = decode(CardFamily::Si5, &blocks(&data), ZERO);

        assert_eq!(
            readout.punches,
            vec![Punch::new(31, Some(ZERO + secs(40000))), Punch::untimed(32)]
        );
        assert_eq!(readout.finish, Some(ZERO + TWELVE_HOURS + secs(1200)));
    }

    #[test]
    fn test_records_finish_follows_last_timed_punch() {
        let mut data = si8_card(0x02);
        // 13:53:20, then a punch without time
        data[136] = 1;
        data[137] = 31;
        put_word(&mut data, 138, 50000 - 43200);
        data[141] = 32;
        put_word(&mut data, 142, EMPTY);
        // 11:06:40 is before the last timed punch, unlike the start
        put_word(&mut data, 18, 40000);

        let readout = decode(CardFamily::Si8Plus, &blocks(&data), ZERO);

        assert_eq!(readout.start, Some(ZERO + secs(36060)));
        assert_eq!(
            readout.punches,
            vec![Punch::new(31, Some(ZERO + secs(50000))), Punch::untimed(32)]
        );
        assert_eq!(readout.finish, Some(ZERO + ONE_DAY + secs(40000)));
    }

    #[test]
    fn test_si6_star_series() {
        let frame = DataFrame::assemble(CardFamily::Si6Star, &blocks(&si6_card()));
        assert_eq!(frame.series(), CardSeries::Si6Star);
        assert_eq!(frame.readout(ZERO).card_series(), "SiCard 6*");
    }

    #[test]
    fn test_si6_count_clamped_to_blocks() {
        let mut data = si6_card();
        data[18] = 200;

        let readout = decode(CardFamily::Si6, &blocks(&data), ZERO);
        assert_eq!(readout.punches.len(), 64);
    }

    fn si8_card(series: u8) -> Vec<u8> {
        let mut data = vec![0u8; 2 * BLOCK_SIZE];
        data[24] = series;
        data[25..28].copy_from_slice(&[0x1E, 0x84, 0x80]);
        put_word(&mut data, 10, 36000);
        put_word(&mut data, 14, 36060);
        put_word(&mut data, 18, 36600);
        data[22] = 2;
        data
    }

    #[test]
    fn test_si8_decode() {
        let mut data = si8_card(0x02);
        data[137] = 31;
        put_word(&mut data, 138, 36120);
        data[141] = 32;
        put_word(&mut data, 142, 36300);

        let readout = decode(CardFamily::Si8Plus, &blocks(&data), ZERO);

        assert_eq!(readout.series, CardSeries::Si8);
        assert_eq!(readout.card_number, "2000000");
        assert_eq!(readout.check, Some(ZERO + secs(36000)));
        assert_eq!(readout.start, Some(ZERO + secs(36060)));
        assert_eq!(readout.finish, Some(ZERO + secs(36600)));
        assert_eq!(
            readout.punches,
            vec![
                Punch::new(31, Some(ZERO + secs(36120))),
                Punch::new(32, Some(ZERO + secs(36300))),
            ]
        );
    }

    #[test]
    fn test_si9_punch_table_in_block_zero() {
        let mut data = si8_card(0x01);
        data[57] = 45;
        put_word(&mut data, 58, 36200);

        let readout = decode(CardFamily::Si8Plus, &blocks(&data), ZERO);
        assert_eq!(readout.series, CardSeries::Si9);
        assert_eq!(readout.punches[0], Punch::new(45, Some(ZERO + secs(36200))));
    }

    #[test]
    fn test_si8_plus_series_nibble() {
        let series = |nibble: u8| {
            DataFrame::assemble(CardFamily::Si8Plus, &blocks(&si8_card(nibble))).series()
        };

        assert_eq!(series(0x02), CardSeries::Si8);
        assert_eq!(series(0x01), CardSeries::Si9);
        assert_eq!(series(0x04), CardSeries::PCard);
        assert_eq!(series(0x0F), CardSeries::Si10Plus);
        assert_eq!(series(0xF2), CardSeries::Si8);
        assert_eq!(series(0x07), CardSeries::Unknown);
    }

    #[test]
    fn test_unknown_series_still_decodes() {
        let readout = decode(CardFamily::Si8Plus, &blocks(&si8_card(0x07)), ZERO);
        assert_eq!(readout.card_series(), "Unknown");
        assert_eq!(readout.card_number, "2000000");
    }

    #[test]
    fn test_si10_plus_punches_in_second_block() {
        let mut data = vec![0u8; 5 * BLOCK_SIZE];
        data[..2 * BLOCK_SIZE].copy_from_slice(&si8_card(0x0F));
        data[22] = 1;
        data[129] = 100;
        put_word(&mut data, 130, 36300);

        let readout = decode(CardFamily::Si8Plus, &blocks(&data), ZERO);
        assert_eq!(readout.series, CardSeries::Si10Plus);
        assert_eq!(readout.punches, vec![Punch::new(100, Some(ZERO + secs(36300)))]);
    }

    #[test]
    fn test_short_blocks_are_padded() {
        let data = si8_card(0x02);
        let short = vec![
            Bytes::copy_from_slice(&data[..BLOCK_SIZE]),
            Bytes::from_static(&[0x00, 0x01]),
        ];

        let frame = DataFrame::assemble(CardFamily::Si8Plus, &short);
        assert_eq!(frame.data.len(), 2 * BLOCK_SIZE);
        assert_eq!(frame.readout(ZERO).card_number, "2000000");
    }

    #[test]
    #[should_panic(expected = "needs 2 blocks")]
    fn test_too_few_blocks_panics() {
        let data = si8_card(0x02);
        decode(CardFamily::Si8Plus, &blocks(&data[..BLOCK_SIZE]), ZERO);
    }

    #[test]
    fn test_layouts() {
        assert_eq!(layout(CardSeries::Si5).clock, Clock::TwelveHour);
        assert_eq!(layout(CardSeries::Si6Star), layout(CardSeries::Si6));
        assert_eq!(
            layout(CardSeries::PCard).punches,
            PunchTable::Records {
                count: 22,
                base: 176
            }
        );
    }
}
