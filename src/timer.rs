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

//! Retransmission deadline.
//!
//! The timer is a deadline on the monotonic clock. While armed, reads are
//! bounded by the time left until the deadline and report [`ReadOutcome::Expired`]
//! once it passes; each arming yields at most one expiry. While disarmed,
//! reads block until a byte arrives.

use std::io::ErrorKind;
use std::time::{Duration, Instant};
use crate::serial::SerialPort;

/// Poll interval for reads with no deadline
const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Byte(u8),
    /// The armed deadline passed. The timer is disarmed.
    Expired,
}

#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new(interval: Duration) -> Self {
        RetransmitTimer { interval, deadline: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start (or restart) a full interval from now.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before expiry, `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Read one byte, bounded by the deadline if armed.
    pub fn read_byte(&mut self, serial: &mut dyn SerialPort) -> std::io::Result<ReadOutcome> {
        let mut buf = [0u8; 1];
        loop {
            let wait = match self.remaining() {
                Some(left) if left.is_zero() => {
                    self.cancel();
                    return Ok(ReadOutcome::Expired);
                }
                Some(left) => left,
                None => IDLE_POLL,
            };

            match serial.read_timeout(&mut buf, wait) {
                Ok(0) => continue,
                Ok(_) => {
                    log::trace!("Read: 0x{:02X}", buf[0]);
                    return Ok(ReadOutcome::Byte(buf[0]));
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if self.is_armed() {
                        // The read was bounded by the deadline, so it has passed
                        self.cancel();
                        return Ok(ReadOutcome::Expired);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
