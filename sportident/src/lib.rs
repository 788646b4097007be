//! # sportident
//!
//! Rust implementation of the SPORTident station readout protocol.
//!
//! ## Features
//!
//! - Station handshake in extended protocol, handshake mode
//! - Readout of SI5, SI6, SI6*, SI8, SI9, SI10, SI11, SIAC and pCard
//! - Async/await API using Tokio over a serial port
//!
//! ## Quick Start
//!
//! ```no_run
//! use sportident::{Event, Reader};
//!
//! #[tokio::main]
//! async fn main() -> sportident::Result<()> {
//!     let mut reader = Reader::new("/dev/ttyUSB0");
//!     reader.open().await?;
//!
//!     loop {
//!         match reader.next_event().await? {
//!             Event::Readout(readout) => {
//!                 println!("{} {}", readout.card_number, readout.punch_count())
//!             }
//!             Event::Closed => break,
//!             other => println!("{:?}", other),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod reader;

// Re-exports
pub use error::{Error, Result};
pub use reader::Reader;

// Re-export types
pub use sportident_core::{Event, SessionConfig, State, StationMode};
pub use sportident_types::{CardSeries, Punch, Readout};
