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

//! Link layer protocol constants

use std::fmt;
use std::str::FromStr;
use crate::error::LinkError;

/// Frame start and end delimiter
pub const FLAG: u8 = 0x7E;

/// Escape byte - the following byte was XORed with `ESC_MASK`
pub const ESC: u8 = 0x7D;

/// Mask applied to a stuffed byte
pub const ESC_MASK: u8 = 0x20;

/// Stuffed substitute for `FLAG`
pub const ESC_FLAG: u8 = FLAG ^ ESC_MASK;

/// Stuffed substitute for `ESC`
pub const ESC_ESC: u8 = ESC ^ ESC_MASK;

/// Address of commands sent by the initiator and of the replies to them
pub const A_TX: u8 = 0x03;

/// Address of commands sent by the responder and of the replies to them
pub const A_RX: u8 = 0x01;

/// Set up - initiator requests a connection
pub const C_SET: u8 = 0x03;

/// Unnumbered acknowledgment - confirms SET or the responder's DISC
pub const C_UA: u8 = 0x07;

/// Disconnect - either side requests or confirms teardown
pub const C_DISC: u8 = 0x0B;

/// Base of the information frame control code, sequence bit in bit 7
pub const C_I: u8 = 0x00;

/// Base of the receiver ready code, expected bit in bit 0
pub const C_RR: u8 = 0xAA;

/// Base of the reject code, expected bit in bit 0
pub const C_REJ: u8 = 0x54;

/// Length of a SET, UA, DISC, RR or REJ frame
pub const CONTROL_FRAME_LEN: usize = 5;

/// Bytes before the payload of a data frame (FLAG, A, C, BCC1)
pub const HEADER_LEN: usize = 4;

/// Largest maximum segment size a session may negotiate
pub const MAX_PAYLOAD_LIMIT: usize = 4096;

/// Role of the local end of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Address carried by commands this role sends.
    pub fn command_address(self) -> u8 {
        match self {
            Role::Initiator => A_TX,
            Role::Responder => A_RX,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Accepts `tx`/`initiator` and `rx`/`responder`, case-insensitively.
impl FromStr for Role {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tx" | "initiator" => Ok(Role::Initiator),
            "rx" | "responder" => Ok(Role::Responder),
            _ => Err(LinkError::InvalidRole(s.to_string())),
        }
    }
}

/// Alternating tag of stop-and-wait data frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceBit {
    #[default]
    Zero,
    One,
}

impl SequenceBit {
    pub fn next(self) -> SequenceBit {
        match self {
            SequenceBit::Zero => SequenceBit::One,
            SequenceBit::One => SequenceBit::Zero,
        }
    }

    pub fn toggle(&mut self) {
        *self = self.next();
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SequenceBit::Zero => 0,
            SequenceBit::One => 1,
        }
    }
}

impl fmt::Display for SequenceBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Control code of an information frame tagged with `seq`.
pub fn c_info(seq: SequenceBit) -> u8 {
    C_I | (seq.as_u8() << 7)
}

/// Control code acknowledging every frame before `expected`.
pub fn c_rr(expected: SequenceBit) -> u8 {
    C_RR | expected.as_u8()
}

/// Control code asking for `expected` to be sent again.
pub fn c_rej(expected: SequenceBit) -> u8 {
    C_REJ | expected.as_u8()
}

/// Sequence bit of an information frame control code, if it is one.
pub fn info_sequence(control: u8) -> Option<SequenceBit> {
    match control {
        c if c == c_info(SequenceBit::Zero) => Some(SequenceBit::Zero),
        c if c == c_info(SequenceBit::One) => Some(SequenceBit::One),
        _ => None,
    }
}

/// Short name of a control code for log output.
pub fn control_name(control: u8) -> &'static str {
    match control {
        C_SET => "SET",
        C_UA => "UA",
        C_DISC => "DISC",
        0x00 => "I(0)",
        0x80 => "I(1)",
        0xAA => "RR(0)",
        0xAB => "RR(1)",
        0x54 => "REJ(0)",
        0x55 => "REJ(1)",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_codes() {
        assert_eq!(c_info(SequenceBit::Zero), 0x00);
        assert_eq!(c_info(SequenceBit::One), 0x80);
        assert_eq!(c_rr(SequenceBit::Zero), 0xAA);
        assert_eq!(c_rr(SequenceBit::One), 0xAB);
        assert_eq!(c_rej(SequenceBit::Zero), 0x54);
        assert_eq!(c_rej(SequenceBit::One), 0x55);
        assert_eq!(info_sequence(0x80), Some(SequenceBit::One));
        assert_eq!(info_sequence(C_SET), None);
    }

    #[test]
    fn test_stuffed_substitutes() {
        assert_eq!(ESC_FLAG, 0x5E);
        assert_eq!(ESC_ESC, 0x5D);
    }

    #[test]
    fn test_sequence_toggle() {
        let mut seq = SequenceBit::default();
        assert_eq!(seq, SequenceBit::Zero);
        seq.toggle();
        assert_eq!(seq, SequenceBit::One);
        assert_eq!(seq.next(), SequenceBit::Zero);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("tx".parse::<Role>().unwrap(), Role::Initiator);
        assert_eq!("Responder".parse::<Role>().unwrap(), Role::Responder);
        assert!(matches!("server".parse::<Role>(), Err(LinkError::InvalidRole(_))));
        assert_eq!(Role::Initiator.command_address(), A_TX);
        assert_eq!(Role::Responder.peer(), Role::Initiator);
    }
}
