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

use thiserror::Error;

/// Reasons a received data frame is rejected by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Header checksum does not equal address XOR control.
    #[error("BCC1 mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    Checksum1Mismatch { expected: u8, found: u8 },

    /// Payload checksum does not equal the XOR of the destuffed payload.
    #[error("BCC2 mismatch: calculated 0x{expected:02X}, received 0x{found:02X}")]
    Checksum2Mismatch { expected: u8, found: u8 },

    /// Frame too short to hold a header and checksum.
    #[error("truncated frame ({0} bytes)")]
    Truncated(usize),

    /// Header is valid but the control code is not an information frame.
    #[error("unexpected control code 0x{0:02X}")]
    UnexpectedControl(u8),

    /// Checksums hold but the payload exceeds the negotiated segment size.
    #[error("payload of {len} bytes exceeds maximum segment size of {max}")]
    Oversized { len: usize, max: usize },
}

/// Errors surfaced by the link layer.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Handshake retry budget exhausted.
    #[error("connection timed out after {attempts} attempts")]
    ConnectionTimeout { attempts: u32 },

    /// Retry budget exhausted while sending a data frame.
    #[error("transfer failed after {timeouts} timeouts and {rejects} rejects")]
    TransferFailed { timeouts: u32, rejects: u32 },

    /// A received frame failed validation.
    #[error("corrupt frame: {0}")]
    FrameCorrupt(#[from] DecodeError),

    /// I/O failure on the serial channel.
    #[error("channel error: {0}")]
    Channel(#[from] std::io::Error),

    #[error("invalid role: {0:?} (expected tx/initiator or rx/responder)")]
    InvalidRole(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("payload of {len} bytes exceeds maximum segment size of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

impl LinkError {
    /// Whether the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinkError::FrameCorrupt(_))
    }
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        LinkError::Channel(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let corrupt = LinkError::from(DecodeError::Truncated(3));
        assert!(!corrupt.is_fatal());
        assert!(LinkError::ConnectionTimeout { attempts: 3 }.is_fatal());
        assert!(LinkError::TransferFailed { timeouts: 3, rejects: 0 }.is_fatal());
    }

    #[test]
    fn test_display() {
        let e = LinkError::from(DecodeError::Checksum2Mismatch { expected: 0x12, found: 0x34 });
        assert_eq!(e.to_string(), "corrupt frame: BCC2 mismatch: calculated 0x12, received 0x34");
    }
}
