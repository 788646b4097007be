//! Error types for sportident-core

/// Result type alias for sportident operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
///
/// Decode and session errors are reported through [`crate::Event`] rather
/// than returned, so they are cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame does not start with STX or end with ETX
    #[error("Framing error: {0}")]
    Framing(&'static str),

    /// Declared parameter count disagrees with the frame size
    #[error("Wrong length: declared {declared} parameters, frame holds {actual}")]
    Length {
        declared: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    Checksum {
        expected: u16,
        received: u16,
    },

    /// Too many parameters for the one-byte count field
    #[error("Too many parameters: {0} (max: 255)")]
    TooManyParameters(usize),

    /// Station answered with NAK
    #[error("Received ERROR (NAK) from SPORTident station")]
    Nak,

    /// Opcode outside the supported command set
    #[error("Ignored received opcode: 0x{0:02X}")]
    UnrecognizedOpcode(u8),

    /// Unexpected SI6 block configuration
    #[error("Unsupported SiCard6 block configuration: 0x{0:02X}")]
    UnsupportedConfiguration(u8),

    /// Station protocol configuration differs from what the reader expects
    #[error("Station configuration: {0}")]
    ProtocolAssumptionViolated(&'static str),

    /// Card pulled out before all blocks were read
    #[error("Card removed too early, readout incomplete")]
    PrematureRemoval,

    /// Block reply out of the expected sequence
    #[error("Unexpected block {received}, expected block {expected}")]
    UnexpectedBlock {
        expected: u8,
        received: u8,
    },

    /// Readout reply too short to hold its card data
    #[error("Truncated readout reply: {len} parameter bytes")]
    ShortBlock {
        len: usize,
    },

    /// Message arrived in a state that cannot handle it
    #[error("Unexpected {0} message in state {1}")]
    UnexpectedMessage(&'static str, &'static str),

    /// Transport failure, as reported by the transport collaborator
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Check if the session cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedConfiguration(_) | Self::Transport(_)
        )
    }

    /// Check if the error comes from a malformed frame
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::Framing(_) | Self::Length { .. } | Self::Checksum { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::UnsupportedConfiguration(0xAB).is_fatal());
        assert!(Error::Transport("unplugged".into()).is_fatal());
        assert!(!Error::PrematureRemoval.is_fatal());
        assert!(!Error::Nak.is_fatal());

        assert!(Error::Framing("Missing STX").is_codec_error());
        assert!(Error::Checksum { expected: 1, received: 2 }.is_codec_error());
        assert!(!Error::UnrecognizedOpcode(0xD3).is_codec_error());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::Checksum { expected: 0x6D0A, received: 0x6D0B }.to_string(),
            "Checksum mismatch: expected 0x6D0A, received 0x6D0B"
        );
        assert_eq!(
            Error::UnsupportedConfiguration(0xAB).to_string(),
            "Unsupported SiCard6 block configuration: 0xAB"
        );
    }
}
