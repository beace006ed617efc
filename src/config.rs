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

//! Session parameters

use std::time::Duration;
use serialport::{DataBits, Parity, StopBits};
use crate::error::LinkError;
use crate::protocol::{Role, MAX_PAYLOAD_LIMIT};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_PAYLOAD: usize = 1000;
/// Longest accepted retransmission timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Character framing of the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineSettings {
    fn default() -> Self {
        LineSettings {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

pub fn parse_data_bits(bits: u8) -> Result<DataBits, LinkError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(LinkError::InvalidConfig(format!("invalid data bits: {}. Must be 5, 6, 7, or 8", bits))),
    }
}

pub fn parse_parity(parity: &str) -> Result<Parity, LinkError> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(LinkError::InvalidConfig(format!("invalid parity: {}. Must be 'none', 'odd', or 'even'", parity))),
    }
}

pub fn parse_stop_bits(bits: u8) -> Result<StopBits, LinkError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(LinkError::InvalidConfig(format!("invalid stop bits: {}. Must be 1 or 2", bits))),
    }
}

/// Parameters fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub role: Role,
    pub port: String,
    pub baud_rate: u32,
    pub line: LineSettings,
    /// Transmissions allowed per handshake step, and per counter per data frame.
    pub max_retries: u32,
    pub timeout: Duration,
    /// Maximum segment size of one packet.
    pub max_payload: usize,
}

impl SessionConfig {
    pub fn new(role: Role, port: impl Into<String>) -> Self {
        SessionConfig {
            role,
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            line: LineSettings::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_line(mut self, line: LineSettings) -> Self {
        self.line = line;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if self.baud_rate == 0 {
            return Err(LinkError::InvalidConfig("baud rate must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(LinkError::InvalidConfig("retry count must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(LinkError::InvalidConfig("timeout must be positive".into()));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(LinkError::InvalidConfig(format!(
                "timeout must be at most {} seconds, got {}",
                MAX_TIMEOUT.as_secs(), self.timeout.as_secs()
            )));
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD_LIMIT {
            return Err(LinkError::InvalidConfig(format!(
                "maximum payload must be between 1 and {} bytes, got {}",
                MAX_PAYLOAD_LIMIT, self.max_payload
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::new(Role::Initiator, "/dev/ttyS0");
        assert!(config.validate().is_ok());
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.max_payload, 1000);
        assert_eq!(config.line, LineSettings::default());
    }

    #[test]
    fn test_validation() {
        let base = SessionConfig::new(Role::Responder, "/dev/ttyS1");
        assert!(base.clone().with_max_retries(0).validate().is_err());
        assert!(base.clone().with_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_timeout(MAX_TIMEOUT).validate().is_ok());
        assert!(base.clone().with_timeout(MAX_TIMEOUT + Duration::from_secs(1)).validate().is_err());
        assert!(base.clone().with_timeout(Duration::from_secs(u64::MAX)).validate().is_err());
        assert!(base.clone().with_max_payload(0).validate().is_err());
        assert!(base.clone().with_max_payload(MAX_PAYLOAD_LIMIT + 1).validate().is_err());
        assert!(base.clone().with_baud_rate(0).validate().is_err());
        assert!(base.with_max_payload(MAX_PAYLOAD_LIMIT).validate().is_ok());
    }

    #[test]
    fn test_parse_line_settings() {
        assert_eq!(parse_data_bits(7).unwrap(), DataBits::Seven);
        assert!(parse_data_bits(9).is_err());
        assert_eq!(parse_parity("EVEN").unwrap(), Parity::Even);
        assert!(parse_parity("mark").is_err());
        assert_eq!(parse_stop_bits(2).unwrap(), StopBits::Two);
        assert!(parse_stop_bits(3).is_err());
    }
}
