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

//! Connection establishment and teardown.
//!
//! ```plain
//! open:   initiator --SET(A_TX)-->  responder
//!         initiator <--UA(A_TX)---  responder
//! close:  initiator --DISC(A_TX)--> responder
//!         initiator <--DISC(A_RX)-- responder
//!         initiator --UA(A_RX)-->   responder
//! ```
//!
//! The initiator retransmits on timeout; the responder waits without a timer.

use crate::error::LinkError;
use crate::frame::{control_frame, decode_data_frame, max_frame_len, ControlFrame, FrameScanner};
use crate::protocol::*;
use crate::session::Link;
use crate::timer::ReadOutcome;

impl Link {
    /// Send `request` until `reply` comes back or the retry budget runs out.
    fn exchange(&mut self, request: &ControlFrame, reply: &ControlFrame) -> Result<(), LinkError> {
        let max_retries = self.config.max_retries;
        let mut attempts = 0;

        while attempts < max_retries {
            if attempts > 0 {
                self.stats.retransmissions += 1;
            }
            self.write_frame(request)?;
            attempts += 1;
            self.state.retries = attempts - 1;
            log::debug!("Sent: {} (attempt {}/{})", control_name(request[2]), attempts, max_retries);

            self.state.timer.arm();
            match self.wait_control(std::slice::from_ref(reply))? {
                Some(_) => {
                    self.state.timer.cancel();
                    self.state.retries = 0;
                    return Ok(());
                }
                None => {
                    self.stats.timeouts += 1;
                    log::warn!(
                        "No {} within {:?} ({}/{})",
                        control_name(reply[2]), self.state.timer.interval(), attempts, max_retries
                    );
                }
            }
        }

        log::warn!("Number of attempts exceeded");
        Err(LinkError::ConnectionTimeout { attempts })
    }

    pub(crate) fn open_initiator(&mut self) -> Result<(), LinkError> {
        let set = control_frame(A_TX, C_SET);
        let ua = control_frame(A_TX, C_UA);
        self.exchange(&set, &ua)
    }

    pub(crate) fn open_responder(&mut self) -> Result<(), LinkError> {
        let set = control_frame(A_TX, C_SET);
        let ua = control_frame(A_TX, C_UA);
        self.state.timer.cancel();
        self.wait_control(&[set])?;
        self.send_control(&ua)
    }

    pub(crate) fn close_initiator(&mut self) -> Result<(), LinkError> {
        let disc = control_frame(A_TX, C_DISC);
        let disc_reply = control_frame(A_RX, C_DISC);
        let ua = control_frame(A_RX, C_UA);
        self.exchange(&disc, &disc_reply)?;
        self.send_control(&ua)
    }

    pub(crate) fn close_responder(&mut self) -> Result<(), LinkError> {
        let disc = control_frame(A_TX, C_DISC);
        let disc_reply = control_frame(A_RX, C_DISC);
        let ua = control_frame(A_RX, C_UA);
        self.state.timer.cancel();

        self.wait_disc(&disc)?;
        self.send_control(&disc_reply)?;

        // A repeated DISC means our reply was lost
        while self.wait_control(&[ua, disc])? == Some(1) {
            log::debug!("DISC repeated, resending reply");
            self.send_control(&disc_reply)?;
        }
        Ok(())
    }

    /// Wait for the peer's DISC, acknowledging any repeat of the last data
    /// frame whose RR was lost on the way back.
    fn wait_disc(&mut self, disc: &ControlFrame) -> Result<(), LinkError> {
        let mut scanner = FrameScanner::new(max_frame_len(self.config.max_payload));
        loop {
            let byte = match self.read_byte()? {
                ReadOutcome::Byte(b) => b,
                ReadOutcome::Expired => continue,
            };
            let Some(raw) = scanner.feed(byte) else { continue };

            if raw.as_slice() == disc.as_slice() {
                log::debug!("Received: DISC (A=0x{:02X})", disc[1]);
                return Ok(());
            }

            if let Ok(frame) = decode_data_frame(&raw) {
                if frame.seq != self.state.recv_seq {
                    self.stats.duplicates += 1;
                    let peer = self.state.role.peer().command_address();
                    self.send_control(&control_frame(peer, c_rr(self.state.recv_seq)))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use crate::config::SessionConfig;
    use crate::frame::encode_data_frame;
    use crate::serial::{script, MockSerialPort};
    use crate::session::{Closed, Open, Session};
    use super::*;

    fn session(role: Role, retries: u32, responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Session<Closed> {
        let config = SessionConfig::new(role, "/dev/null")
            .with_max_retries(retries)
            .with_timeout(Duration::from_secs(3));
        let mock = Box::new(MockSerialPort::new(responses, expected_writes));
        Session::new(mock, config).unwrap()
    }

    /// Initiator whose SET was answered at once.
    fn opened_initiator(retries: u32, mut responses: Vec<Option<u8>>, mut expected_writes: Vec<u8>) -> Session<Open> {
        let mut r = script(&control_frame(A_TX, C_UA));
        r.append(&mut responses);
        let mut w = control_frame(A_TX, C_SET).to_vec();
        w.append(&mut expected_writes);
        session(Role::Initiator, retries, r, w).open().unwrap()
    }

    #[test]
    fn test_open_after_dropped_sets() {
        let set = control_frame(A_TX, C_SET);
        let max_retries = 4;
        for dropped in 0..max_retries {
            let mut responses = vec![None; dropped as usize];
            responses.extend(script(&control_frame(A_TX, C_UA)));
            let expected_writes = set.repeat(dropped as usize + 1);

            let session = session(Role::Initiator, max_retries, responses, expected_writes)
                .open()
                .expect("open should succeed");
            assert_eq!(session.statistics().timeouts, dropped as u64);
            assert_eq!(session.state().retries(), 0);
        }
    }

    #[test]
    fn test_open_times_out() {
        let set = control_frame(A_TX, C_SET);
        let responses = vec![None; 3];
        let expected_writes = set.repeat(3);

        let result = session(Role::Initiator, 3, responses, expected_writes).open();
        assert!(matches!(result, Err(LinkError::ConnectionTimeout { attempts: 3 })));
    }

    #[test]
    fn test_open_ignores_noise_and_wrong_frames() {
        let mut responses = script(&[0x00, 0x7E, 0x11]);
        responses.extend(script(&control_frame(A_RX, C_UA)));
        responses.extend(script(&control_frame(A_TX, C_UA)));

        let session = session(Role::Initiator, 3, responses, control_frame(A_TX, C_SET).to_vec());
        assert!(session.open().is_ok());
    }

    #[test]
    fn test_responder_waits_for_set() {
        let mut responses = vec![None, None];
        responses.extend(script(&control_frame(A_TX, C_DISC)));
        responses.extend(script(&control_frame(A_TX, C_SET)));

        let session = session(Role::Responder, 3, responses, control_frame(A_TX, C_UA).to_vec());
        assert!(session.open().is_ok());
    }

    #[test]
    fn test_close_initiator_retries_disc() {
        let disc = control_frame(A_TX, C_DISC);
        let mut responses = vec![None];
        responses.extend(script(&control_frame(A_RX, C_DISC)));

        let mut expected_writes = disc.repeat(2);
        expected_writes.extend_from_slice(&control_frame(A_RX, C_UA));

        let session = opened_initiator(3, responses, expected_writes);
        let stats = session.close().unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.retransmissions, 1);
    }

    #[test]
    fn test_close_initiator_times_out() {
        let disc = control_frame(A_TX, C_DISC);
        let session = opened_initiator(2, vec![None, None], disc.repeat(2));
        assert!(matches!(session.close(), Err(LinkError::ConnectionTimeout { attempts: 2 })));
    }

    #[test]
    fn test_close_responder_resends_lost_disc_reply() {
        let disc = control_frame(A_TX, C_DISC);
        let disc_reply = control_frame(A_RX, C_DISC);

        let mut responses = script(&control_frame(A_TX, C_SET));
        responses.extend(script(&disc));
        responses.extend(script(&disc));
        responses.extend(script(&control_frame(A_RX, C_UA)));

        let mut expected_writes = control_frame(A_TX, C_UA).to_vec();
        expected_writes.extend_from_slice(&disc_reply);
        expected_writes.extend_from_slice(&disc_reply);

        let session = session(Role::Responder, 3, responses, expected_writes).open().unwrap();
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_close_responder_acknowledges_duplicate_data() {
        let data = encode_data_frame(A_TX, SequenceBit::Zero, b"last");
        let rr = control_frame(A_TX, c_rr(SequenceBit::One));

        let mut responses = script(&control_frame(A_TX, C_SET));
        responses.extend(script(&data));
        // RR lost, sender repeats the frame before giving up on it
        responses.extend(script(&data));
        responses.extend(script(&control_frame(A_TX, C_DISC)));
        responses.extend(script(&control_frame(A_RX, C_UA)));

        let mut expected_writes = control_frame(A_TX, C_UA).to_vec();
        expected_writes.extend_from_slice(&rr);
        expected_writes.extend_from_slice(&rr);
        expected_writes.extend_from_slice(&control_frame(A_RX, C_DISC));

        let mut session = session(Role::Responder, 3, responses, expected_writes).open().unwrap();
        assert_eq!(session.receive().unwrap(), b"last".to_vec());
        let stats = session.close().unwrap();
        assert_eq!(stats.duplicates, 1);
    }
}
