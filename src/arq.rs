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

//! Stop-and-wait transfer.
//!
//! The sender tags each frame with its send bit and waits for RR of the
//! other bit. REJ and timer expiry both resend the same frame but are
//! budgeted by separate counters. The receiver answers a frame with a bad
//! header with silence, a bad payload with REJ, and a repeat of the last
//! accepted frame with the RR it already sent.

use crate::error::{DecodeError, LinkError};
use crate::frame::{control_frame, decode_data_frame, encode_data_frame, max_frame_len, FrameScanner};
use crate::protocol::*;
use crate::session::Link;
use crate::timer::ReadOutcome;

impl Link {
    pub(crate) fn send_packet(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        let max = self.config.max_payload;
        if payload.len() > max {
            return Err(LinkError::PayloadTooLarge { len: payload.len(), max });
        }

        let address = self.state.role.command_address();
        let seq = self.state.send_seq;
        let frame = encode_data_frame(address, seq, payload);
        let rr = control_frame(address, c_rr(seq.next()));
        let rej = control_frame(address, c_rej(seq));

        let max_retries = self.config.max_retries;
        let mut timeouts = 0;
        let mut rejects = 0;
        self.state.retries = 0;

        loop {
            self.write_frame(&frame)?;
            log::debug!("Sent: I({}) with {} bytes ({} on the wire)", seq, payload.len(), frame.len());
            self.state.timer.arm();

            match self.wait_control(&[rr, rej])? {
                Some(0) => {
                    self.state.timer.cancel();
                    self.state.send_seq.toggle();
                    self.state.retries = 0;
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += payload.len() as u64;
                    return Ok(payload.len());
                }
                Some(_) => {
                    self.state.timer.cancel();
                    rejects += 1;
                    self.stats.rejects_received += 1;
                    log::warn!("REJ received. Retransmitting frame, attempt {}/{}", rejects, max_retries);
                }
                None => {
                    timeouts += 1;
                    self.stats.timeouts += 1;
                    log::warn!(
                        "No RR({}) within {:?}, {}/{}",
                        seq.next(), self.state.timer.interval(), timeouts, max_retries
                    );
                }
            }

            if timeouts >= max_retries || rejects >= max_retries {
                log::warn!("Maximum number of attempts exceeded");
                return Err(LinkError::TransferFailed { timeouts, rejects });
            }
            self.state.retries = timeouts + rejects;
            self.stats.retransmissions += 1;
        }
    }

    pub(crate) fn receive_packet(&mut self) -> Result<Vec<u8>, LinkError> {
        self.state.timer.cancel();
        let peer = self.state.role.peer().command_address();
        let mut scanner = FrameScanner::new(max_frame_len(self.config.max_payload));

        loop {
            let byte = match self.read_byte()? {
                ReadOutcome::Byte(b) => b,
                ReadOutcome::Expired => continue,
            };
            let Some(raw) = scanner.feed(byte) else { continue };

            if raw.len() <= CONTROL_FRAME_LEN {
                self.handle_stray_control(&raw)?;
                continue;
            }

            let expected = self.state.recv_seq;
            let max = self.config.max_payload;
            match decode_data_frame(&raw) {
                Ok(frame) if frame.payload.len() > max => {
                    let e = DecodeError::Oversized { len: frame.payload.len(), max };
                    log::warn!("{}, discarding frame", e);
                    self.stats.corrupt_frames += 1;
                    return Err(e.into());
                }
                Ok(frame) if frame.seq == expected => {
                    self.send_control(&control_frame(peer, c_rr(expected.next())))?;
                    self.state.recv_seq.toggle();
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += frame.payload.len() as u64;
                    log::debug!("Received: I({}) with {} bytes", frame.seq, frame.payload.len());
                    return Ok(frame.payload);
                }
                Ok(frame) => {
                    // Our RR was lost and the sender repeated the frame
                    log::debug!("Duplicate I({}), acknowledging again", frame.seq);
                    self.stats.duplicates += 1;
                    self.send_control(&control_frame(peer, c_rr(expected)))?;
                }
                Err(e @ DecodeError::Checksum2Mismatch { .. }) => {
                    log::warn!("{}, sending REJ({})", e, expected);
                    self.stats.corrupt_frames += 1;
                    self.stats.rejects_sent += 1;
                    self.send_control(&control_frame(peer, c_rej(expected)))?;
                    return Err(e.into());
                }
                Err(e) => {
                    // Header can't be trusted; the sender's timer recovers
                    log::warn!("{}, discarding frame", e);
                    self.stats.corrupt_frames += 1;
                    return Err(e.into());
                }
            }
        }
    }

    /// Answer a short frame seen while waiting for data.
    fn handle_stray_control(&mut self, raw: &[u8]) -> Result<(), LinkError> {
        let set = control_frame(A_TX, C_SET);
        if self.state.role == Role::Responder && raw == set.as_slice() {
            // UA never reached the initiator
            log::debug!("SET repeated, resending UA");
            self.send_control(&control_frame(A_TX, C_UA))?;
        } else {
            log::trace!("Ignoring frame {:02X?}", raw);
        }
        Ok(())
    }
}
