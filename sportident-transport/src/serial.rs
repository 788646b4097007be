//! Serial transport

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Default BSM station speed
pub const DEFAULT_BAUD_RATE: u32 = 38400;

const READ_BUFFER_SIZE: usize = 1024;

/// Serial transport for SPORTident stations (8N1)
pub struct SerialTransport {
    port: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Create new serial transport
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            stream: None,
        }
    }

    /// Set the serial speed, 38400 or 4800 for older stations
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        debug!(port = %self.port, baud_rate = self.baud_rate, "Opening serial port");

        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()?;

        debug!(port = %self.port, "Serial port open");

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!(port = %self.port, "Closing serial port");

            let _ = stream.shutdown().await;
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!(len = data.len(), data = %hex::encode(data), "Sending");

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let n = stream.read_buf(&mut buf).await?;

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!(len = n, data = %hex::encode(&buf), "Received");

        Ok(buf)
    }

    fn port_name(&self) -> String {
        self.port.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!(port = %self.port, "Serial transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serial_transport_create() {
        let transport = SerialTransport::new("/dev/ttyUSB0");
        assert!(!transport.is_connected());
        assert_eq!(transport.baud_rate(), 38400);
        assert_eq!(transport.port_name(), "/dev/ttyUSB0");

        let transport = transport.with_baud_rate(4800);
        assert_eq!(transport.baud_rate(), 4800);
    }

    #[tokio::test]
    async fn test_serial_transport_not_connected() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0");

        assert!(matches!(transport.send(&[0xFF]).await, Err(Error::NotConnected)));
        assert!(matches!(transport.receive().await, Err(Error::NotConnected)));
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_serial_transport_missing_port() {
        let mut transport = SerialTransport::new("/dev/sportident-does-not-exist");

        let result = transport.connect().await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    #[ignore = "requires a BSM station on /dev/ttyUSB0"]
    async fn test_serial_transport_connect() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0");
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}
