//! SPORTident command bytes
//!
//! Only the subset of the extended protocol that a readout station needs.

use std::fmt;

use crate::error::{Error, Result};

/// Protocol command bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Station control
    SetMasterMode = 0xF0,
    Beep = 0xF9,
    GetSystemValue = 0x83,

    // Card detection (sent by the station)
    Si5Detected = 0xE5,
    Si6Detected = 0xE6,
    Si8PlusDetected = 0xE8,
    CardRemoved = 0xE7,

    // Card readout
    GetSi5 = 0xB1,
    GetSi6Block = 0xE1,
    GetSi8PlusBlock = 0xEF,
}

impl Opcode {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::SetMasterMode => "SET_MASTER_MODE",
            Self::Beep => "BEEP",
            Self::GetSystemValue => "GET_SYSTEM_VALUE",
            Self::Si5Detected => "SI_CARD_5_DETECTED",
            Self::Si6Detected => "SI_CARD_6_PLUS_DETECTED",
            Self::Si8PlusDetected => "SI_CARD_8_PLUS_DETECTED",
            Self::CardRemoved => "SI_CARD_REMOVED",
            Self::GetSi5 => "GET_SI_CARD_5",
            Self::GetSi6Block => "GET_SI_CARD_6_BN",
            Self::GetSi8PlusBlock => "GET_SI_CARD_8_PLUS_BN",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0xF0 => Ok(Self::SetMasterMode),
            0xF9 => Ok(Self::Beep),
            0x83 => Ok(Self::GetSystemValue),
            0xE5 => Ok(Self::Si5Detected),
            0xE6 => Ok(Self::Si6Detected),
            0xE8 => Ok(Self::Si8PlusDetected),
            0xE7 => Ok(Self::CardRemoved),
            0xB1 => Ok(Self::GetSi5),
            0xE1 => Ok(Self::GetSi6Block),
            0xEF => Ok(Self::GetSi8PlusBlock),
            _ => Err(Error::UnrecognizedOpcode(value)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(u8::from(Opcode::GetSi8PlusBlock), 0xEF);
        assert_eq!(Opcode::try_from(0xE5).unwrap(), Opcode::Si5Detected);
    }

    #[test]
    fn test_opcode_round_trip() {
        for byte in 0..=u8::MAX {
            if let Ok(opcode) = Opcode::try_from(byte) {
                assert_eq!(u8::from(opcode), byte);
            }
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            Opcode::try_from(0x42),
            Err(Error::UnrecognizedOpcode(0x42))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::Beep.to_string(), "BEEP(0xF9)");
    }
}
