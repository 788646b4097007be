//! SPORTident frame checksum
//!
//! The vendor calls it a CRC, but it is not a textbook CRC-16: the data is
//! shifted into the accumulator one bit at a time as a carry, and a virtual
//! last word is always processed.
//!
//! 1. Fewer than 2 bytes: checksum is 0
//! 2. Seed the accumulator with the first big-endian word
//! 3. For every following word, and one last virtual word (the odd trailing
//!    byte shifted left by 8, or 0 for even lengths), run 16 rounds of
//!    shift-left, carry-in of the word's top bit, and XOR with 0x8005 when the
//!    accumulator's top bit was set before the shift
//! 4. Return the low 16 bits

use tracing::trace;

const POLYNOMIAL: u16 = 0x8005;
const TOP_BIT: u16 = 0x8000;

/// Calculate the checksum of a byte span
///
/// # Examples
///
/// ```
/// use sportident_core::checksum;
///
/// // SET_MASTER_MODE(DIRECT_MODE)
/// assert_eq!(checksum::calculate(&[0xF0, 0x01, 0x4D]), 0x6D0A);
/// ```
pub fn calculate(data: &[u8]) -> u16 {
    if data.len() < 2 {
        return 0;
    }

    let mut sum = u16::from_be_bytes([data[0], data[1]]);

    if data.len() > 2 {
        let mut words = data[2..].chunks_exact(2);
        for word in &mut words {
            sum = shift_word(sum, u16::from_be_bytes([word[0], word[1]]));
        }

        let last = match words.remainder() {
            [odd] => u16::from(*odd) << 8,
            _ => 0,
        };
        sum = shift_word(sum, last);
    }

    trace!(
        len = data.len(),
        checksum = %format!("0x{:04X}", sum),
        "Calculated checksum"
    );

    sum
}

fn shift_word(mut sum: u16, mut word: u16) -> u16 {
    for _ in 0..16 {
        let overflow = sum & TOP_BIT != 0;
        sum <<= 1;
        if word & TOP_BIT != 0 {
            sum = sum.wrapping_add(1);
        }
        if overflow {
            sum ^= POLYNOMIAL;
        }
        word <<= 1;
    }
    sum
}

/// Verify checksum
pub fn verify(data: &[u8], expected: u16) -> bool {
    calculate(data) == expected
}
