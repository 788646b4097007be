//! Station session state machine
//!
//! The controller is sans-IO: the host feeds it transport notifications
//! (`on_open`, `on_data`, `on_transport_error`, `on_close`) and drains the
//! frames to write with [`SessionController::poll_transmit`] and the events
//! to deliver with [`SessionController::poll_event`]. Nothing is delivered
//! from inside a notification, so listeners never re-enter the transport.
//!
//! Exchanges are strictly half-duplex: every command after the startup
//! sequence is sent in reaction to the reply to the previous one.

use std::collections::VecDeque;
use std::fmt;

use bitflags::bitflags;
use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use sportident_types::{time, Readout};

use crate::constants::{
    card6, reply, series, system, BLOCK_SIZE, DEFAULT_BAUD_RATE, NAK, STARTUP_SEQUENCE,
};
use crate::dataframe::{self, CardFamily};
use crate::error::{Error, Result};
use crate::message::{self, Message};
use crate::opcode::Opcode;

const SI5_SEQUENCE: &[u8] = &[0];
const SI6_SEQUENCE: &[u8] = &[0, 6, 7];
const SI6_192_SEQUENCE: &[u8] = &[0, 6, 7, 2, 3, 4, 5];
const SI8_SEQUENCE: &[u8] = &[0, 1];
const SI10_PLUS_SEQUENCE: &[u8] = &[0, 4, 5, 6, 7];

bitflags! {
    /// Station protocol configuration (CPC system byte)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpcFlags: u8 {
        const EXTENDED_PROTOCOL = 0x01;
        const AUTO_SEND = 0x02;
        const HANDSHAKE = 0x04;
    }
}

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    zero_hour: i64,
    mute: bool,
    baud_rate: u32,
}

impl SessionConfig {
    /// Default configuration: zero hour at local midnight, beeps on, 38400 baud
    pub fn new() -> Self {
        Self {
            zero_hour: time::start_of_today(),
            mute: false,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Set the anchor, in epoch milliseconds, for on-card times
    ///
    /// Resolved times saturate at the ends of the `i64` range.
    pub fn with_zero_hour(mut self, zero_hour: i64) -> Self {
        self.zero_hour = zero_hour;
        self
    }

    /// Do not make the station beep
    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    /// Serial speed reported in the ready event
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn zero_hour(&self) -> i64 {
        self.zero_hour
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Transport not open yet
    #[default]
    Idle,

    /// Startup sequence sent, waiting for SET_MASTER_MODE
    AwaitingHandshakeAck,

    /// Waiting for the CPC system value
    AwaitingProtocolConfig,

    /// Waiting for the SI6 block configuration
    AwaitingBlockConfig,

    /// Configured, waiting for a card
    Ready,

    /// Card inserted, first readout command about to be sent
    CardDetected,

    /// Reading card blocks
    AccumulatingBlocks,

    /// Card read and decoded, waiting for removal or the next card
    ReadComplete,

    /// Transport closed
    Closed,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitingHandshakeAck => "AwaitingHandshakeAck",
            Self::AwaitingProtocolConfig => "AwaitingProtocolConfig",
            Self::AwaitingBlockConfig => "AwaitingBlockConfig",
            Self::Ready => "Ready",
            Self::CardDetected => "CardDetected",
            Self::AccumulatingBlocks => "AccumulatingBlocks",
            Self::ReadComplete => "ReadComplete",
            Self::Closed => "Closed",
        }
    }

    /// Check if the station is configured and can read cards
    pub fn accepts_cards(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::CardDetected | Self::AccumulatingBlocks | Self::ReadComplete
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SI6 memory layout configured on the station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Card6Layout {
    /// Blocks 0, 6 and 7
    Punches64,
    /// Blocks 0, 6, 7 and 2 to 5
    Punches192,
}

impl Card6Layout {
    /// Interpret the card6blocks system byte
    ///
    /// 0x00 is what older firmware reports for the 64 punch layout.
    pub fn from_config(value: u8) -> Result<Self> {
        match value {
            card6::LEGACY | card6::PUNCHES_64 => Ok(Self::Punches64),
            card6::PUNCHES_192 => Ok(Self::Punches192),
            other => Err(Error::UnsupportedConfiguration(other)),
        }
    }

    /// Blocks to read, in punch table order
    pub fn blocks(self) -> &'static [u8] {
        match self {
            Self::Punches64 => SI6_SEQUENCE,
            Self::Punches192 => SI6_192_SEQUENCE,
        }
    }

    /// Punches an SI6 card can hold in this layout
    pub fn punch_capacity(self) -> usize {
        (self.blocks().len() - 1) * card6::PUNCHES_PER_BLOCK
    }
}

/// Station configuration reported once the session is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationMode {
    pub punch_capacity: usize,
    pub baud_rate: u32,
    pub card6_blocks: Card6Layout,
}

/// Session output for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Station configured and waiting for cards
    Ready(StationMode),
    /// Transport closed
    Closed,
    Error(Error),
    Warning(Error),
    /// Card read completely
    Readout(Readout),
}

/// Read of the card currently in the station
#[derive(Debug, Clone)]
struct CardRead {
    family: CardFamily,
    sequence: &'static [u8],
    blocks: Vec<Bytes>,
    completed: bool,
}

impl CardRead {
    fn new(family: CardFamily, sequence: &'static [u8]) -> Self {
        Self {
            family,
            sequence,
            blocks: Vec::with_capacity(sequence.len()),
            completed: false,
        }
    }

    fn next_block(&self) -> Option<u8> {
        self.sequence.get(self.blocks.len()).copied()
    }

    fn read_opcode(&self) -> Opcode {
        match self.family {
            CardFamily::Si5 => Opcode::GetSi5,
            CardFamily::Si6 | CardFamily::Si6Star => Opcode::GetSi6Block,
            CardFamily::Si8Plus => Opcode::GetSi8PlusBlock,
        }
    }
}

/// All mutable per-connection data
///
/// Each transition takes the value and returns its successor.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    state: State,
    card6: Option<Card6Layout>,
    card: Option<CardRead>,
}

impl SessionState {
    pub fn state(&self) -> State {
        self.state
    }

    /// Negotiated SI6 layout, once the station is configured
    pub fn card6_layout(&self) -> Option<Card6Layout> {
        self.card6
    }

    /// Check if a card is being read and not yet complete
    pub fn is_reading(&self) -> bool {
        self.card.as_ref().is_some_and(|card| !card.completed)
    }
}

/// Session controller for one station connection
///
/// # Examples
///
/// ```
/// use sportident_core::{SessionConfig, SessionController, State};
///
/// let mut session = SessionController::new(SessionConfig::new().with_mute(true));
/// session.on_open();
///
/// let startup = session.poll_transmit().unwrap();
/// assert_eq!(startup[0], 0xFF);
/// assert_eq!(session.state(), State::AwaitingHandshakeAck);
/// ```
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    session: SessionState,
    transmit: VecDeque<Bytes>,
    events: VecDeque<Event>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: SessionState::default(),
            transmit: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Change the zero hour for the following cards
    pub fn set_zero_hour(&mut self, zero_hour: i64) {
        self.config.zero_hour = zero_hour;
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Next frame to write to the transport
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        self.transmit.pop_front()
    }

    /// Next event for the application
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Transport opened: start the handshake
    ///
    /// Any previous negotiation is discarded.
    pub fn on_open(&mut self) {
        info!("Transport open, sending startup sequence");

        self.transmit.clear();
        self.transmit.push_back(Bytes::from_static(&STARTUP_SEQUENCE));
        self.session = self.enter(SessionState::default(), State::AwaitingHandshakeAck);
    }

    /// One delivery from the transport, assumed frame-aligned
    pub fn on_data(&mut self, data: &[u8]) {
        trace!(len = data.len(), data = %hex::encode(data), "Received");

        if data.first() == Some(&NAK) {
            self.error(Error::Nak);
            return;
        }

        let message = match message::parse(data) {
            Ok(message) => message,
            Err(e) => {
                self.error(e);
                return;
            }
        };

        let session = std::mem::take(&mut self.session);
        self.session = self.dispatch(session, &message);
    }

    /// Transport failure; the in-flight command is not resent
    pub fn on_transport_error(&mut self, err: impl fmt::Display) {
        self.error(Error::Transport(err.to_string()));
    }

    /// Transport closed: drop all state
    pub fn on_close(&mut self) {
        if self.session.is_reading() {
            debug!("Transport closed during card readout");
        }

        self.transmit.clear();
        self.session = self.enter(SessionState::default(), State::Closed);
        self.events.push_back(Event::Closed);
    }

    fn dispatch(&mut self, session: SessionState, message: &Message) -> SessionState {
        match message.opcode() {
            Ok(Opcode::SetMasterMode) => self.on_master_mode(session),
            Ok(Opcode::GetSystemValue) => self.on_system_value(session, message),
            Ok(Opcode::Beep) => session,
            Ok(Opcode::Si5Detected) => {
                self.on_card_detected(session, CardFamily::Si5, SI5_SEQUENCE)
            }
            Ok(Opcode::Si6Detected) => {
                if message.parameter(reply::SI2_INDEX) == Some(series::SI_CARD_6_STAR) {
                    let layout = session.card6.unwrap_or(Card6Layout::Punches64);
                    self.on_card_detected(session, CardFamily::Si6Star, layout.blocks())
                } else {
                    self.on_card_detected(session, CardFamily::Si6, SI6_SEQUENCE)
                }
            }
            Ok(Opcode::Si8PlusDetected) => {
                if message.parameter(reply::SI3_INDEX) == Some(series::SI_CARD_10_PLUS) {
                    self.on_card_detected(session, CardFamily::Si8Plus, SI10_PLUS_SEQUENCE)
                } else {
                    self.on_card_detected(session, CardFamily::Si8Plus, SI8_SEQUENCE)
                }
            }
            Ok(Opcode::CardRemoved) => self.on_card_removed(session),
            Ok(opcode @ (Opcode::GetSi5 | Opcode::GetSi6Block | Opcode::GetSi8PlusBlock)) => {
                self.on_block(session, opcode, message)
            }
            Err(e) => {
                self.warning(e);
                session
            }
        }
    }

    fn on_master_mode(&mut self, session: SessionState) -> SessionState {
        if session.state != State::AwaitingHandshakeAck {
            debug!(state = %session.state, "Ignoring SET_MASTER_MODE acknowledgement");
            return session;
        }

        self.send(Opcode::GetSystemValue, &[system::CPC, system::VALUE_LEN]);
        self.enter(session, State::AwaitingProtocolConfig)
    }

    fn on_system_value(&mut self, mut session: SessionState, message: &Message) -> SessionState {
        let address = message.parameter(reply::ADDRESS_INDEX);
        let value = message.parameter(reply::VALUE_INDEX);

        match (session.state, address, value) {
            (State::AwaitingProtocolConfig, Some(system::CPC), Some(cpc)) => {
                self.check_cpc(CpcFlags::from_bits_retain(cpc));
                self.send(Opcode::GetSystemValue, &[system::CARD6_BLOCKS, system::VALUE_LEN]);
                self.enter(session, State::AwaitingBlockConfig)
            }
            (State::AwaitingBlockConfig, Some(system::CARD6_BLOCKS), Some(blocks)) => {
                let layout = match Card6Layout::from_config(blocks) {
                    Ok(layout) => layout,
                    Err(e) => {
                        self.error(e);
                        return session;
                    }
                };

                let mode = StationMode {
                    punch_capacity: layout.punch_capacity(),
                    baud_rate: self.config.baud_rate,
                    card6_blocks: layout,
                };
                info!(
                    punch_capacity = mode.punch_capacity,
                    baud_rate = mode.baud_rate,
                    "Station ready"
                );

                session.card6 = Some(layout);
                self.events.push_back(Event::Ready(mode));
                self.beep(2);
                self.enter(session, State::Ready)
            }
            _ => {
                self.warning(Error::UnexpectedMessage(
                    Opcode::GetSystemValue.name(),
                    session.state.name(),
                ));
                session
            }
        }
    }

    fn check_cpc(&mut self, cpc: CpcFlags) {
        debug!(cpc = ?cpc, "Station protocol configuration");

        if !cpc.contains(CpcFlags::EXTENDED_PROTOCOL) {
            self.error(Error::ProtocolAssumptionViolated(
                "extended protocol must be enabled",
            ));
        }
        if cpc.contains(CpcFlags::AUTO_SEND) {
            self.warning(Error::ProtocolAssumptionViolated(
                "auto send must be disabled",
            ));
        }
        if !cpc.contains(CpcFlags::HANDSHAKE) {
            self.warning(Error::ProtocolAssumptionViolated(
                "handshake mode must be enabled",
            ));
        }
    }

    fn on_card_detected(
        &mut self,
        mut session: SessionState,
        family: CardFamily,
        sequence: &'static [u8],
    ) -> SessionState {
        if !session.state.accepts_cards() {
            self.warning(Error::UnexpectedMessage("card detection", session.state.name()));
            return session;
        }
        if session.is_reading() {
            debug!("New card detected, previous readout abandoned");
        }

        info!(?family, blocks = sequence.len(), "Card detected");

        let card = CardRead::new(family, sequence);
        let opcode = card.read_opcode();
        let first = card.next_block();
        session.card = Some(card);
        let session = self.enter(session, State::CardDetected);

        match (family, first) {
            (CardFamily::Si5, _) | (_, None) => self.send(opcode, &[]),
            (_, Some(block)) => self.send(opcode, &[block]),
        }
        self.enter(session, State::AccumulatingBlocks)
    }

    fn on_block(
        &mut self,
        mut session: SessionState,
        opcode: Opcode,
        message: &Message,
    ) -> SessionState {
        let zero_hour = self.config.zero_hour;
        let Some(card) = session.card.as_mut() else {
            self.warning(Error::UnexpectedMessage(opcode.name(), session.state.name()));
            return session;
        };
        if card.read_opcode() != opcode {
            self.warning(Error::UnexpectedMessage(opcode.name(), session.state.name()));
            return session;
        }
        if card.completed {
            debug!(%opcode, "Ignoring block received after readout completed");
            return session;
        }

        let payload = message.payload();
        let data_index = match opcode {
            Opcode::GetSi5 => reply::SI5_DATA_INDEX,
            _ => reply::BLOCK_DATA_INDEX,
        };
        if payload.len() < data_index + BLOCK_SIZE {
            self.error(Error::ShortBlock { len: payload.len() });
            return session;
        }

        if opcode != Opcode::GetSi5 {
            let expected = card.next_block().unwrap_or_default();
            let received = payload[reply::BLOCK_NUMBER_INDEX];
            if received != expected {
                self.warning(Error::UnexpectedBlock { expected, received });
                return session;
            }
        }

        card.blocks.push(payload.slice(data_index..data_index + BLOCK_SIZE));
        trace!(blocks = card.blocks.len(), total = card.sequence.len(), "Block received");

        if let Some(next) = card.next_block() {
            self.send(opcode, &[next]);
            return self.enter(session, State::AccumulatingBlocks);
        }

        let blocks = std::mem::take(&mut card.blocks);
        let readout = dataframe::decode(card.family, &blocks, zero_hour);
        card.completed = true;

        info!(
            series = readout.card_series(),
            card = %readout.card_number,
            punches = readout.punch_count(),
            "Card read"
        );

        self.beep(1);
        self.events.push_back(Event::Readout(readout));
        self.enter(session, State::ReadComplete)
    }

    fn on_card_removed(&mut self, mut session: SessionState) -> SessionState {
        if session.is_reading() {
            self.warning(Error::PrematureRemoval);
        }
        session.card = None;

        if session.state.accepts_cards() {
            self.enter(session, State::Ready)
        } else {
            session
        }
    }

    fn enter(&self, mut session: SessionState, to: State) -> SessionState {
        if session.state != to {
            debug!(from = %session.state, to = %to, "State transition");
        }
        session.state = to;
        session
    }

    fn send(&mut self, opcode: Opcode, parameters: &[u8]) {
        debug!(%opcode, params = ?parameters, "Sending");
        self.transmit
            .push_back(message::encode_frame(opcode.into(), parameters).freeze());
    }

    fn beep(&mut self, count: u8) {
        if count > 0 && !self.config.mute {
            self.send(Opcode::Beep, &[count]);
        }
    }

    fn error(&mut self, e: Error) {
        error!("{}", e);
        self.events.push_back(Event::Error(e));
    }

    fn warning(&mut self, e: Error) {
        warn!("{}", e);
        self.events.push_back(Event::Warning(e));
    }
}
