//! Protocol constants

/// Wakeup byte sent ahead of the first frame
pub const WAKEUP: u8 = 0xFF;

/// Start of frame
pub const STX: u8 = 0x02;

/// End of frame
pub const ETX: u8 = 0x03;

/// Negative acknowledgement, delivered as a standalone byte
pub const NAK: u8 = 0x15;

/// Parameter of SET_MASTER_MODE selecting direct mode
pub const DIRECT_MODE: u8 = 0x4D;

/// Default serial speed of BSM7/BSM8 stations
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Startup sequence, sent once per connection
///
/// A wakeup byte and an extra STX, then a framed SET_MASTER_MODE(DIRECT_MODE)
/// command. The checksum is precomputed.
pub const STARTUP_SEQUENCE: [u8; 9] = [
    WAKEUP,
    STX,
    STX,
    0xF0,
    0x01,
    DIRECT_MODE,
    0x6D,
    0x0A,
    ETX,
];

/// Size of one card memory block
pub const BLOCK_SIZE: usize = 128;

/// Bytes of a frame that are not parameters: STX, opcode, count, crc1, crc0, ETX
pub const FRAME_OVERHEAD: usize = 6;

/// Station system memory addresses (GET_SYSTEM_VALUE)
pub mod system {
    /// Protocol configuration (CPC) byte
    pub const CPC: u8 = 0x74;

    /// SI6 block configuration byte
    pub const CARD6_BLOCKS: u8 = 0x33;

    /// Every value is read one byte at a time
    pub const VALUE_LEN: u8 = 0x01;
}

/// Parameter positions in station replies
///
/// Replies start with the two-byte station code, so the first meaningful
/// parameter is at index 2.
pub mod reply {
    /// System memory address echoed by GET_SYSTEM_VALUE
    pub const ADDRESS_INDEX: usize = 2;

    /// Value byte returned by GET_SYSTEM_VALUE
    pub const VALUE_INDEX: usize = 3;

    /// Block number of SI6 and SI8+ block replies
    pub const BLOCK_NUMBER_INDEX: usize = 2;

    /// Start of the card data in SI6 and SI8+ block replies
    pub const BLOCK_DATA_INDEX: usize = 3;

    /// Start of the card data in the SI5 reply
    pub const SI5_DATA_INDEX: usize = 2;

    /// Series byte (SI3) of a card detection message
    pub const SI3_INDEX: usize = 2;

    /// Top byte of the card number (SI2) of a card detection message
    pub const SI2_INDEX: usize = 3;
}

/// Card series markers found in detection messages
pub mod series {
    /// SI3 value announcing SI10, SI11 and SIAC
    pub const SI_CARD_10_PLUS: u8 = 0x0F;

    /// SI2 value of the SI6* number range (16711680..=16777215)
    pub const SI_CARD_6_STAR: u8 = 0xFF;
}

/// SI6 block configuration values (card6blocks system byte)
pub mod card6 {
    /// Legacy value, read as 0xC1
    pub const LEGACY: u8 = 0x00;

    /// Blocks 0, 6 and 7: 64 punches
    pub const PUNCHES_64: u8 = 0xC1;

    /// All blocks: 192 punches
    pub const PUNCHES_192: u8 = 0xFF;

    /// Punch records held by one SI6 block
    pub const PUNCHES_PER_BLOCK: usize = 32;
}
