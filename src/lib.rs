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

//! Reliable stop-and-wait data link over a half-duplex serial line.
//!
//! A session is opened with a SET/UA handshake, carries data frames that
//! are acknowledged one at a time with RR/REJ, and is closed with a
//! DISC/DISC/UA exchange.
//!
//! ```no_run
//! use serlink::{open, Role, SessionConfig};
//!
//! let config = SessionConfig::new(Role::Initiator, "/dev/ttyS0");
//! let mut session = open(config)?;
//! session.send(b"hello")?;
//! let stats = session.close()?;
//! println!("{}", stats);
//! # Ok::<(), serlink::LinkError>(())
//! ```

mod arq;
pub mod config;
pub mod error;
pub mod frame;
mod handshake;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod timer;
pub mod transfer;

pub use config::{LineSettings, SessionConfig};
pub use error::{DecodeError, LinkError};
pub use protocol::{Role, SequenceBit};
pub use serial::{RealSerialPort, SerialPort};
pub use session::{open, Closed, LinkStatistics, Open, Session, SessionState};
