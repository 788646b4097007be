//! # sportident-core
//!
//! Sans-IO implementation of the SPORTident station protocol.
//!
//! This crate provides:
//! - Frame checksum
//! - Wire frame building and parsing
//! - Card memory decoding for SI5, SI6, SI8 to SI11, SIAC and pCard
//! - The station session state machine

pub mod checksum;
pub mod constants;
pub mod dataframe;
pub mod error;
pub mod message;
pub mod opcode;
pub mod session;
pub mod timing;

pub use dataframe::{decode, CardFamily, DataFrame};
pub use error::{Error, Result};
pub use message::Message;
pub use opcode::Opcode;
pub use session::{
    Card6Layout, CpcFlags, Event, SessionConfig, SessionController, SessionState, State,
    StationMode,
};
