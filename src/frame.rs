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

//! Frame encoding, decoding and delimiting.
//!
//! ```plain
//! control: | FLAG | A | C | BCC1 | FLAG |
//! data:    | FLAG | A | C | BCC1 | stuffed payload | stuffed BCC2 | FLAG |
//! ```
//!
//! BCC1 is `A ^ C`. BCC2 is the XOR of the unstuffed payload. Any `FLAG` or
//! `ESC` in the stuffed region is sent as `ESC, byte ^ 0x20`.

use crate::error::DecodeError;
use crate::protocol::*;

// ============================================================================
// Encoding
// ============================================================================

pub type ControlFrame = [u8; CONTROL_FRAME_LEN];

pub fn control_frame(address: u8, control: u8) -> ControlFrame {
    [FLAG, address, control, address ^ control, FLAG]
}

/// XOR of every byte in `data`.
pub fn bcc2(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

fn stuff_byte(out: &mut Vec<u8>, byte: u8) {
    if byte == FLAG || byte == ESC {
        out.push(ESC);
        out.push(byte ^ ESC_MASK);
    } else {
        out.push(byte);
    }
}

pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &b in data {
        stuff_byte(&mut out, b);
    }
    out
}

/// Reverse `stuff`. A trailing lone `ESC` is dropped.
pub fn destuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&b) = bytes.next() {
        if b == ESC {
            if let Some(&escaped) = bytes.next() {
                out.push(escaped ^ ESC_MASK);
            }
        } else {
            out.push(b);
        }
    }
    out
}

pub fn encode_data_frame(address: u8, seq: SequenceBit, payload: &[u8]) -> Vec<u8> {
    let control = c_info(seq);
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() * 2 + 3);
    frame.extend_from_slice(&[FLAG, address, control, address ^ control]);
    for &b in payload {
        stuff_byte(&mut frame, b);
    }
    stuff_byte(&mut frame, bcc2(payload));
    frame.push(FLAG);
    frame
}

/// Worst-case encoded length of a data frame carrying `max_payload` bytes.
pub fn max_frame_len(max_payload: usize) -> usize {
    HEADER_LEN + (max_payload + 1) * 2 + 1
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub address: u8,
    pub seq: SequenceBit,
    pub payload: Vec<u8>,
}

/// Validate a delimited data frame and extract its payload.
///
/// The header is checked before anything is destuffed, so a
/// `Checksum1Mismatch` means nothing else about the frame can be trusted.
pub fn decode_data_frame(raw: &[u8]) -> Result<DataFrame, DecodeError> {
    if raw.len() < HEADER_LEN + 2 {
        return Err(DecodeError::Truncated(raw.len()));
    }

    let address = raw[1];
    let control = raw[2];
    let expected = address ^ control;
    if raw[3] != expected {
        return Err(DecodeError::Checksum1Mismatch { expected, found: raw[3] });
    }

    let seq = info_sequence(control).ok_or(DecodeError::UnexpectedControl(control))?;

    let body = &raw[HEADER_LEN..raw.len() - 1];
    let mut payload = destuff(body);
    let received = payload.pop().ok_or(DecodeError::Truncated(raw.len()))?;
    let calculated = bcc2(&payload);
    if calculated != received {
        return Err(DecodeError::Checksum2Mismatch { expected: calculated, found: received });
    }

    Ok(DataFrame { address, seq, payload })
}

// ============================================================================
// Control frame matcher
// ============================================================================

/// Progress of the fixed-length control frame matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    WaitDelimiter,
    /// Number of bytes accumulated so far.
    Reading(usize),
    /// A full-length candidate ending in `FLAG` is buffered.
    Matched,
}

/// Next matcher state after `byte`.
pub fn match_transition(state: MatchState, byte: u8) -> MatchState {
    match state {
        MatchState::WaitDelimiter | MatchState::Matched => {
            if byte == FLAG {
                MatchState::Reading(1)
            } else {
                MatchState::WaitDelimiter
            }
        }
        // Back-to-back delimiters: keep the latest as the opening flag
        MatchState::Reading(1) if byte == FLAG => MatchState::Reading(1),
        MatchState::Reading(index) if index + 1 == CONTROL_FRAME_LEN => {
            if byte == FLAG {
                MatchState::Matched
            } else {
                MatchState::WaitDelimiter
            }
        }
        MatchState::Reading(index) => MatchState::Reading(index + 1),
    }
}

/// Recognizes control frames in a byte stream by comparing against templates.
///
/// A candidate that matches none of the templates is dropped and the
/// matcher goes back to hunting for a delimiter.
#[derive(Debug)]
pub struct ControlMatcher {
    state: MatchState,
    buf: ControlFrame,
}

impl Default for ControlMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMatcher {
    pub fn new() -> Self {
        ControlMatcher { state: MatchState::WaitDelimiter, buf: [0; CONTROL_FRAME_LEN] }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = MatchState::WaitDelimiter;
        self.buf = [0; CONTROL_FRAME_LEN];
    }

    /// Feed one byte. Returns the index of the matching template when a
    /// candidate completes.
    pub fn feed(&mut self, byte: u8, templates: &[ControlFrame]) -> Option<usize> {
        let next = match_transition(self.state, byte);
        match next {
            MatchState::WaitDelimiter => {
                self.reset();
                None
            }
            MatchState::Reading(count) => {
                self.buf[count - 1] = byte;
                self.state = next;
                None
            }
            MatchState::Matched => {
                self.buf[CONTROL_FRAME_LEN - 1] = byte;
                let found = templates.iter().position(|t| *t == self.buf);
                if found.is_some() {
                    self.state = MatchState::Matched;
                } else {
                    log::trace!("Discarding control frame {:02X?}", self.buf);
                    self.reset();
                }
                found
            }
        }
    }
}

// ============================================================================
// Data frame scanner
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    WaitDelimiter,
    Reading,
}

/// What the scanner should do with one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    /// Ignore the byte.
    Skip,
    /// Drop anything buffered and start a new frame with this delimiter.
    Start,
    Append,
    /// Append the closing delimiter and emit the frame.
    Finish,
    /// Frame grew past the limit; drop it.
    Overrun,
}

/// Next scanner state and action given the number of bytes buffered.
pub fn scan_transition(state: ScanState, buffered: usize, limit: usize, byte: u8) -> (ScanState, ScanAction) {
    match state {
        ScanState::WaitDelimiter if byte == FLAG => (ScanState::Reading, ScanAction::Start),
        ScanState::WaitDelimiter => (ScanState::WaitDelimiter, ScanAction::Skip),
        // Back-to-back delimiters: the closing flag of a lost frame followed
        // by the opening flag of the next one.
        ScanState::Reading if byte == FLAG && buffered <= 1 => (ScanState::Reading, ScanAction::Start),
        ScanState::Reading if byte == FLAG => (ScanState::WaitDelimiter, ScanAction::Finish),
        ScanState::Reading if buffered >= limit => (ScanState::WaitDelimiter, ScanAction::Overrun),
        ScanState::Reading => (ScanState::Reading, ScanAction::Append),
    }
}

/// Delimits variable-length frames from FLAG to FLAG.
#[derive(Debug)]
pub struct FrameScanner {
    state: ScanState,
    buf: Vec<u8>,
    limit: usize,
}

impl FrameScanner {
    pub fn new(limit: usize) -> Self {
        FrameScanner { state: ScanState::WaitDelimiter, buf: Vec::with_capacity(limit), limit }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        let (next, action) = scan_transition(self.state, self.buf.len(), self.limit, byte);
        self.state = next;
        match action {
            ScanAction::Skip => None,
            ScanAction::Start => {
                self.buf.clear();
                self.buf.push(byte);
                None
            }
            ScanAction::Append => {
                self.buf.push(byte);
                None
            }
            ScanAction::Finish => {
                self.buf.push(byte);
                Some(std::mem::take(&mut self.buf))
            }
            ScanAction::Overrun => {
                log::warn!("Frame exceeded {} bytes, discarding", self.limit);
                self.buf.clear();
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(matcher: &mut ControlMatcher, bytes: &[u8], templates: &[ControlFrame]) -> Vec<usize> {
        bytes.iter().filter_map(|&b| matcher.feed(b, templates)).collect()
    }

    #[test]
    fn test_control_frame_layout() {
        assert_eq!(control_frame(A_TX, C_SET), [0x7E, 0x03, 0x03, 0x00, 0x7E]);
        assert_eq!(control_frame(A_TX, C_UA), [0x7E, 0x03, 0x07, 0x04, 0x7E]);
        assert_eq!(control_frame(A_RX, C_DISC), [0x7E, 0x01, 0x0B, 0x0A, 0x7E]);
    }

    #[test]
    fn test_stuffing_example() {
        let payload = [0x7E, 0x01, 0x7D, 0x02];
        assert_eq!(stuff(&payload), vec![0x7D, 0x5E, 0x01, 0x7D, 0x5D, 0x02]);
        assert_eq!(destuff(&stuff(&payload)), payload.to_vec());
    }

    #[test]
    fn test_stuffing_round_trip_all_bytes() {
        let payload: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        let stuffed = stuff(&payload);
        assert!(!stuffed.contains(&FLAG));

        // Every ESC in the output must introduce a substitute
        let mut i = 0;
        while i < stuffed.len() {
            if stuffed[i] == ESC {
                assert!(stuffed[i + 1] == ESC_FLAG || stuffed[i + 1] == ESC_ESC);
                i += 2;
            } else {
                i += 1;
            }
        }

        assert_eq!(destuff(&stuffed), payload);
    }

    #[test]
    fn test_bcc2_fold() {
        assert_eq!(bcc2(&[]), 0);
        assert_eq!(bcc2(&[0x5A]), 0x5A);
        assert_eq!(bcc2(&[0x01, 0x02, 0x04]), 0x07);
        for len in 0..64usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 37) as u8).collect();
            let expected = data.iter().fold(0u8, |acc, &b| acc ^ b);
            assert_eq!(bcc2(&data), expected);
        }
    }

    #[test]
    fn test_encode_data_frame_layout() {
        let frame = encode_data_frame(A_TX, SequenceBit::One, &[0x10, 0x20]);
        assert_eq!(frame, vec![FLAG, A_TX, 0x80, A_TX ^ 0x80, 0x10, 0x20, 0x30, FLAG]);
    }

    #[test]
    fn test_encode_stuffs_bcc2() {
        // 0x7E alone: BCC2 is also 0x7E and must be escaped
        let frame = encode_data_frame(A_TX, SequenceBit::Zero, &[0x7E]);
        assert_eq!(frame, vec![FLAG, A_TX, 0x00, A_TX, ESC, ESC_FLAG, ESC, ESC_FLAG, FLAG]);
        assert_eq!(frame.iter().filter(|&&b| b == FLAG).count(), 2);

        let decoded = decode_data_frame(&frame).unwrap();
        assert_eq!(decoded.payload, vec![0x7E]);

        // 0x7D followed by 0x00: BCC2 is the escape byte
        let frame = encode_data_frame(A_TX, SequenceBit::Zero, &[0x7D, 0x00]);
        assert_eq!(&frame[frame.len() - 3..], &[ESC, ESC_ESC, FLAG]);
        assert_eq!(decode_data_frame(&frame).unwrap().payload, vec![0x7D, 0x00]);
    }

    #[test]
    fn test_decode_data_frame() {
        let payload = b"hello \x7E world \x7D".to_vec();
        let frame = encode_data_frame(A_RX, SequenceBit::One, &payload);
        let decoded = decode_data_frame(&frame).unwrap();
        assert_eq!(decoded, DataFrame { address: A_RX, seq: SequenceBit::One, payload });
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = encode_data_frame(A_TX, SequenceBit::Zero, &[]);
        assert_eq!(frame.len(), 6);
        assert!(decode_data_frame(&frame).unwrap().payload.is_empty());
    }

    #[test]
    fn test_decode_checksum1_mismatch() {
        let mut frame = encode_data_frame(A_TX, SequenceBit::Zero, b"abc");
        frame[3] ^= 0xFF;
        assert_eq!(
            decode_data_frame(&frame),
            Err(DecodeError::Checksum1Mismatch { expected: A_TX, found: A_TX ^ 0xFF })
        );
    }

    #[test]
    fn test_decode_checksum2_mismatch() {
        let mut frame = encode_data_frame(A_TX, SequenceBit::Zero, b"abc");
        frame[5] = b'x';
        assert!(matches!(
            decode_data_frame(&frame),
            Err(DecodeError::Checksum2Mismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_info_frames() {
        let frame = [FLAG, A_TX, C_SET, A_TX ^ C_SET, 0x00, FLAG];
        assert_eq!(decode_data_frame(&frame), Err(DecodeError::UnexpectedControl(C_SET)));
        assert_eq!(decode_data_frame(&control_frame(A_TX, C_SET)), Err(DecodeError::Truncated(5)));
    }

    #[test]
    fn test_match_transition() {
        let mut state = MatchState::WaitDelimiter;
        state = match_transition(state, 0x42);
        assert_eq!(state, MatchState::WaitDelimiter);
        for (i, &b) in control_frame(A_TX, C_UA).iter().enumerate() {
            state = match_transition(state, b);
            if i + 1 < CONTROL_FRAME_LEN {
                assert_eq!(state, MatchState::Reading(i + 1));
            }
        }
        assert_eq!(state, MatchState::Matched);

        // Full length without a closing delimiter resets
        let mut state = MatchState::Reading(4);
        state = match_transition(state, 0x00);
        assert_eq!(state, MatchState::WaitDelimiter);

        assert_eq!(match_transition(MatchState::Reading(1), FLAG), MatchState::Reading(1));
        assert_eq!(match_transition(MatchState::Reading(2), FLAG), MatchState::Reading(3));
    }

    #[test]
    fn test_matcher_after_closing_flag_of_wrong_frame() {
        let ua = control_frame(A_TX, C_UA);
        let mut matcher = ControlMatcher::new();
        // Misaligned on a truncated frame, so the wrong frame's closing flag
        // is taken as an opening one
        let mut stream = vec![FLAG, 0x11];
        stream.extend_from_slice(&control_frame(A_RX, C_UA));
        stream.extend_from_slice(&ua);
        assert_eq!(feed_all(&mut matcher, &stream, &[ua]), vec![0]);
    }

    #[test]
    fn test_matcher_finds_template() {
        let ua = control_frame(A_TX, C_UA);
        let set = control_frame(A_TX, C_SET);
        let mut matcher = ControlMatcher::new();
        let mut stream = vec![0x00, 0x13];
        stream.extend_from_slice(&ua);
        assert_eq!(feed_all(&mut matcher, &stream, &[set, ua]), vec![1]);
        assert_eq!(matcher.state(), MatchState::Matched);
    }

    #[test]
    fn test_matcher_resyncs_after_mismatch() {
        let ua = control_frame(A_TX, C_UA);
        let mut matcher = ControlMatcher::new();
        let mut stream = control_frame(A_RX, C_UA).to_vec();
        stream.extend_from_slice(&[FLAG, A_TX, 0x99]);
        stream.extend_from_slice(&[0x01, 0x02]);
        stream.extend_from_slice(&ua);
        assert_eq!(feed_all(&mut matcher, &stream, &[ua]), vec![0]);
    }

    #[test]
    fn test_scanner_delimits_frames() {
        let a = encode_data_frame(A_TX, SequenceBit::Zero, b"first");
        let b = encode_data_frame(A_TX, SequenceBit::One, b"\x7Esecond");
        let mut stream = vec![0x55, 0x66];
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut scanner = FrameScanner::new(max_frame_len(16));
        let frames: Vec<Vec<u8>> = stream.iter().filter_map(|&x| scanner.feed(x)).collect();
        assert_eq!(frames, vec![a, b]);
    }

    #[test]
    fn test_scanner_back_to_back_delimiters() {
        let frame = encode_data_frame(A_TX, SequenceBit::Zero, b"x");
        let mut stream = vec![FLAG, FLAG];
        stream.extend_from_slice(&frame);

        let mut scanner = FrameScanner::new(64);
        let frames: Vec<Vec<u8>> = stream.iter().filter_map(|&x| scanner.feed(x)).collect();
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_scanner_overrun() {
        let mut scanner = FrameScanner::new(8);
        let mut stream = vec![FLAG];
        stream.extend_from_slice(&[0x11; 12]);
        stream.push(FLAG);
        let frame = encode_data_frame(A_TX, SequenceBit::Zero, b"ok");
        stream.extend_from_slice(&frame);

        let frames: Vec<Vec<u8>> = stream.iter().filter_map(|&x| scanner.feed(x)).collect();
        // The overrun frame's closing flag opens a new (empty) one
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_scan_transition() {
        assert_eq!(scan_transition(ScanState::WaitDelimiter, 0, 10, 0x01), (ScanState::WaitDelimiter, ScanAction::Skip));
        assert_eq!(scan_transition(ScanState::WaitDelimiter, 0, 10, FLAG), (ScanState::Reading, ScanAction::Start));
        assert_eq!(scan_transition(ScanState::Reading, 1, 10, FLAG), (ScanState::Reading, ScanAction::Start));
        assert_eq!(scan_transition(ScanState::Reading, 5, 10, FLAG), (ScanState::WaitDelimiter, ScanAction::Finish));
        assert_eq!(scan_transition(ScanState::Reading, 10, 10, 0x01), (ScanState::WaitDelimiter, ScanAction::Overrun));
    }
}
