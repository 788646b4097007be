//! Transport layer for SPORTident stations
//!
//! Provides serial communication with BSM stations.

pub mod error;
pub mod serial;

pub use error::{Error, Result};
pub use serial::SerialTransport;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send {
    /// Open the port
    async fn connect(&mut self) -> Result<()>;

    /// Close the port
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one delivery of raw bytes
    ///
    /// Waits until the station sends something.
    async fn receive(&mut self) -> Result<BytesMut>;

    /// Port name, e.g. `/dev/ttyUSB0`
    fn port_name(&self) -> String;
}
