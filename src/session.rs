// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::fmt;
use std::marker::PhantomData;
use crate::config::SessionConfig;
use crate::error::LinkError;
use crate::frame::{ControlFrame, ControlMatcher};
use crate::protocol::*;
use crate::serial::{RealSerialPort, SerialPort};
use crate::timer::{ReadOutcome, RetransmitTimer};

// ============================================================================
// Session State
// ============================================================================

/// Mutable protocol state of one session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub(crate) role: Role,
    pub(crate) send_seq: SequenceBit,
    pub(crate) recv_seq: SequenceBit,
    pub(crate) retries: u32,
    pub(crate) timer: RetransmitTimer,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Self {
        SessionState {
            role: config.role,
            send_seq: SequenceBit::Zero,
            recv_seq: SequenceBit::Zero,
            retries: 0,
            timer: RetransmitTimer::new(config.timeout),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Tag of the next data frame this end sends.
    pub fn send_seq(&self) -> SequenceBit {
        self.send_seq
    }

    /// Tag of the next data frame this end accepts.
    pub fn recv_seq(&self) -> SequenceBit {
        self.recv_seq
    }

    /// Retransmissions of the operation in progress (or the last failed one).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }
}

/// Counters reported when a session closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatistics {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub rejects_sent: u64,
    pub rejects_received: u64,
    pub duplicates: u64,
    pub corrupt_frames: u64,
}

impl fmt::Display for LinkStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} packets ({} bytes), received {} packets ({} bytes), \
             {} retransmissions, {} timeouts, REJ sent/received {}/{}, \
             {} duplicates, {} corrupt frames",
            self.packets_sent, self.bytes_sent, self.packets_received, self.bytes_received,
            self.retransmissions, self.timeouts, self.rejects_sent, self.rejects_received,
            self.duplicates, self.corrupt_frames,
        )
    }
}

// ============================================================================
// Link
// ============================================================================

/// Channel and protocol state shared by the handshake and transfer logic
pub(crate) struct Link {
    pub(crate) serial: Box<dyn SerialPort>,
    pub(crate) config: SessionConfig,
    pub(crate) state: SessionState,
    pub(crate) stats: LinkStatistics,
}

impl Link {
    pub(crate) fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.serial.write_all(frame)?;
        Ok(())
    }

    pub(crate) fn send_control(&mut self, frame: &ControlFrame) -> Result<(), LinkError> {
        self.write_frame(frame)?;
        log::debug!("Sent: {} (A=0x{:02X})", control_name(frame[2]), frame[1]);
        Ok(())
    }

    pub(crate) fn read_byte(&mut self) -> Result<ReadOutcome, LinkError> {
        Ok(self.state.timer.read_byte(self.serial.as_mut())?)
    }

    /// Read until one of `templates` arrives. Returns its index, or `None`
    /// if the armed timer expires first. Blocks indefinitely when disarmed.
    pub(crate) fn wait_control(&mut self, templates: &[ControlFrame]) -> Result<Option<usize>, LinkError> {
        let mut matcher = ControlMatcher::new();
        loop {
            match self.read_byte()? {
                ReadOutcome::Expired => return Ok(None),
                ReadOutcome::Byte(b) => {
                    if let Some(index) = matcher.feed(b, templates) {
                        let frame = &templates[index];
                        log::debug!("Received: {} (A=0x{:02X})", control_name(frame[2]), frame[1]);
                        return Ok(Some(index));
                    }
                }
            }
        }
    }
}

// ============================================================================
// States
// ============================================================================

/// Channel owned, no connection yet
pub struct Closed;

/// Handshake completed, data may flow
pub struct Open;

// ============================================================================
// Session
// ============================================================================

pub struct Session<State> {
    state: PhantomData<State>,
    link: Link,
}

impl<S> Session<S> {
    fn transition<T>(self) -> Session<T> {
        Session {
            state: PhantomData,
            link: self.link,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.link.config
    }

    pub fn state(&self) -> &SessionState {
        &self.link.state
    }

    pub fn statistics(&self) -> &LinkStatistics {
        &self.link.stats
    }
}

impl Session<Closed> {
    pub fn new(serial: Box<dyn SerialPort>, config: SessionConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let state = SessionState::new(&config);
        Ok(Session {
            state: PhantomData,
            link: Link {
                serial,
                config,
                state,
                stats: LinkStatistics::default(),
            },
        })
    }

    /// Run the connection handshake for the configured role.
    pub fn open(mut self) -> Result<Session<Open>, LinkError> {
        self.link.state = SessionState::new(&self.link.config);
        match self.link.state.role {
            Role::Initiator => self.link.open_initiator()?,
            Role::Responder => self.link.open_responder()?,
        }
        log::info!("Connection established as {}", self.link.state.role);
        Ok(self.transition())
    }
}

impl Session<Open> {
    /// Deliver one packet, retransmitting until it is acknowledged.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        self.link.send_packet(payload)
    }

    /// Wait for the next new packet from the peer.
    pub fn receive(&mut self) -> Result<Vec<u8>, LinkError> {
        self.link.receive_packet()
    }

    /// Tear the connection down and release the channel.
    pub fn close(mut self) -> Result<LinkStatistics, LinkError> {
        match self.link.state.role {
            Role::Initiator => self.link.close_initiator()?,
            Role::Responder => self.link.close_responder()?,
        }
        self.link.state.timer.cancel();
        let stats = self.link.stats;
        log::info!("Connection closed: {}", stats);
        Ok(stats)
    }
}

/// Open the configured serial device and connect.
pub fn open(config: SessionConfig) -> Result<Session<Open>, LinkError> {
    config.validate()?;
    let port = RealSerialPort::open(&config.port, config.baud_rate, config.line)?;
    Session::new(Box::new(port), config)?.open()
}

// ============================================================================
// Tests
// ============================================================================
