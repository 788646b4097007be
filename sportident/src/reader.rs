//! High-level station reader

use tracing::{debug, info, warn};

use sportident_core::{Event, SessionConfig, SessionController, State};
use sportident_transport::{Error as TransportError, SerialTransport, Transport};
use sportident_types::Readout;

use crate::error::{Error, Result};

/// SPORTident station reader
///
/// Drives a transport through the session state machine and hands out its
/// events one at a time.
///
/// # Examples
///
/// ```no_run
/// use sportident::{Event, Reader};
///
/// #[tokio::main]
/// async fn main() -> sportident::Result<()> {
///     let mut reader = Reader::new("/dev/ttyUSB0");
///     reader.open().await?;
///
///     while let Some(readout) = reader.next_readout().await? {
///         println!("{} {}", readout.card_series(), readout.card_number);
///     }
///     Ok(())
/// }
/// ```
pub struct Reader {
    transport: Box<dyn Transport>,
    session: SessionController,
}

impl Reader {
    /// Create a reader on a serial port at 38400 baud
    pub fn new(port: impl Into<String>) -> Self {
        Self::with_transport(SerialTransport::new(port), SessionConfig::new())
    }

    /// Create a reader over any transport
    pub fn with_transport(transport: impl Transport + 'static, config: SessionConfig) -> Self {
        Self {
            transport: Box::new(transport),
            session: SessionController::new(config),
        }
    }

    /// Set the anchor, in epoch milliseconds, for on-card times
    pub fn with_zero_hour(mut self, zero_hour: i64) -> Self {
        self.session.set_zero_hour(zero_hour);
        self
    }

    /// Do not make the station beep
    ///
    /// Resets the session, so call it before [`Reader::open`].
    pub fn with_mute(self, mute: bool) -> Self {
        let config = self.session.config().with_mute(mute);
        Self {
            transport: self.transport,
            session: SessionController::new(config),
        }
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    pub fn port_name(&self) -> String {
        self.transport.port_name()
    }

    /// Check if the transport is open
    pub fn is_open(&self) -> bool {
        self.transport.is_connected() && !matches!(self.state(), State::Idle | State::Closed)
    }

    /// Open the transport and start the station handshake
    pub async fn open(&mut self) -> Result<()> {
        info!(port = %self.transport.port_name(), "Opening station");

        self.transport.connect().await?;
        self.session.on_open();
        self.flush().await;

        Ok(())
    }

    /// Wait for the next session event
    ///
    /// Returns [`Event::Closed`] once when the transport goes away, then
    /// [`Error::NotOpen`].
    pub async fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.session.poll_event() {
                return Ok(event);
            }
            if !self.is_open() {
                return Err(Error::NotOpen);
            }

            match self.transport.receive().await {
                Ok(data) => {
                    self.session.on_data(&data);
                    self.flush().await;
                }
                Err(TransportError::ConnectionClosed) => {
                    debug!("Transport closed by station");
                    if let Err(e) = self.transport.disconnect().await {
                        debug!("Disconnect after close failed: {}", e);
                    }
                    self.session.on_close();
                }
                Err(e) => self.session.on_transport_error(e),
            }
        }
    }

    /// Wait for the next card readout
    ///
    /// Returns `None` once the transport is closed. Fatal session errors are
    /// returned; other errors and warnings are logged and skipped.
    pub async fn next_readout(&mut self) -> Result<Option<Readout>> {
        loop {
            match self.next_event().await {
                Ok(Event::Readout(readout)) => return Ok(Some(readout)),
                Ok(Event::Closed) | Err(Error::NotOpen) => return Ok(None),
                Ok(Event::Ready(mode)) => debug!(?mode, "Station ready"),
                Ok(Event::Error(e)) if e.is_fatal() => return Err(e.into()),
                Ok(Event::Error(e) | Event::Warning(e)) => warn!("{}", e),
                Err(e) => return Err(e),
            }
        }
    }

    /// Close the transport
    ///
    /// The session emits [`Event::Closed`].
    pub async fn close(&mut self) -> Result<()> {
        info!(port = %self.transport.port_name(), "Closing station");

        self.transport.disconnect().await?;
        self.session.on_close();

        Ok(())
    }

    async fn flush(&mut self) {
        while let Some(frame) = self.session.poll_transmit() {
            if let Err(e) = self.transport.send(&frame).await {
                self.session.on_transport_error(e);
                break;
            }
        }
    }
}
