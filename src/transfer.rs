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

//! File transfer over an open session.
//!
//! ```plain
//! start/end: | C (2/3) | T=0 | L=8 | size (u64 BE) | T=1 | L | name |
//! data:      | C=1 | N | L2 | L1 | L2*256+L1 bytes |
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use crate::error::LinkError;
use crate::session::{Open, Session};

pub const C_DATA: u8 = 0x01;
pub const C_START: u8 = 0x02;
pub const C_END: u8 = 0x03;

pub const T_FILE_SIZE: u8 = 0x00;
pub const T_FILE_NAME: u8 = 0x01;

/// Bytes before the file data in a data packet
pub const DATA_HEADER_LEN: usize = 4;

const MAX_NAME_LEN: usize = 255;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("file size mismatch: announced {expected} bytes, received {received}")]
    SizeMismatch { expected: u64, received: u64 },
}

// ============================================================================
// Packets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub name: String,
}

pub fn control_packet(kind: u8, info: &FileInfo) -> Result<Vec<u8>, TransferError> {
    let name = info.name.as_bytes();
    if name.len() > MAX_NAME_LEN {
        return Err(TransferError::Malformed(format!("file name of {} bytes is too long", name.len())));
    }

    let mut packet = Vec::with_capacity(13 + name.len());
    packet.push(kind);
    packet.extend_from_slice(&[T_FILE_SIZE, 8]);
    packet.extend_from_slice(&info.size.to_be_bytes());
    packet.extend_from_slice(&[T_FILE_NAME, name.len() as u8]);
    packet.extend_from_slice(name);
    Ok(packet)
}

pub fn parse_control_packet(packet: &[u8]) -> Result<FileInfo, TransferError> {
    let mut size = None;
    let mut name = None;
    let mut rest = packet.get(1..).unwrap_or_default();

    while !rest.is_empty() {
        let [t, l, tail @ ..] = rest else {
            return Err(TransferError::Malformed("truncated TLV header".into()));
        };
        let len = *l as usize;
        if tail.len() < len {
            return Err(TransferError::Malformed(format!("TLV 0x{:02X} truncated", t)));
        }
        let (value, next) = tail.split_at(len);
        match *t {
            T_FILE_SIZE => {
                let bytes: [u8; 8] = value.try_into()
                    .map_err(|_| TransferError::Malformed(format!("file size of {} bytes", len)))?;
                size = Some(u64::from_be_bytes(bytes));
            }
            T_FILE_NAME => name = Some(String::from_utf8_lossy(value).into_owned()),
            other => log::debug!("Skipping unknown TLV 0x{:02X}", other),
        }
        rest = next;
    }

    match (size, name) {
        (Some(size), Some(name)) => Ok(FileInfo { size, name }),
        _ => Err(TransferError::Malformed("control packet missing size or name".into())),
    }
}

pub fn data_packet(n: u8, data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(DATA_HEADER_LEN + data.len());
    packet.push(C_DATA);
    packet.push(n);
    packet.extend_from_slice(&(data.len() as u16).to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

fn parse_data_packet(packet: &[u8]) -> Result<(u8, &[u8]), TransferError> {
    let [_, n, l2, l1, data @ ..] = packet else {
        return Err(TransferError::Malformed("truncated data packet".into()));
    };
    let len = *l2 as usize * 256 + *l1 as usize;
    if data.len() != len {
        return Err(TransferError::Malformed(format!("data packet announces {} bytes, carries {}", len, data.len())));
    }
    Ok((*n, data))
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct TransferReport {
    pub bytes: u64,
    pub elapsed: Duration,
    pub baud_rate: u32,
}

impl TransferReport {
    pub fn bit_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { (self.bytes * 8) as f64 / secs } else { 0.0 }
    }

    /// Received bit rate as a fraction of link capacity.
    pub fn efficiency(&self) -> f64 {
        self.bit_rate() / self.baud_rate as f64
    }

    pub fn log(&self) {
        log::info!("Bits transferred: {}", self.bytes * 8);
        log::info!("Link capacity: {} bits/s", self.baud_rate);
        log::info!("Transfer time: {:.3} s", self.elapsed.as_secs_f64());
        log::info!("Bit rate (R): {:.3} bits/s", self.bit_rate());
        log::info!("Efficiency (S): {:.3}", self.efficiency());
    }
}

// ============================================================================
// Transfer
// ============================================================================

/// Size and bare name of the file at `path`.
pub fn file_info(path: &Path) -> Result<FileInfo, TransferError> {
    Ok(FileInfo {
        size: std::fs::metadata(path)?.len(),
        name: path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

/// Check that the start/end packets for `info` and at least one byte of
/// file data fit in a packet of `max_payload` bytes.
pub fn check_packet_sizes(info: &FileInfo, max_payload: usize) -> Result<(), TransferError> {
    if max_payload <= DATA_HEADER_LEN {
        return Err(LinkError::InvalidConfig("maximum payload too small for data packets".into()).into());
    }
    let len = control_packet(C_START, info)?.len();
    if len > max_payload {
        return Err(LinkError::PayloadTooLarge { len, max: max_payload }.into());
    }
    Ok(())
}

pub fn send_file(session: &mut Session<Open>, path: &Path) -> Result<TransferReport, TransferError> {
    let max_payload = session.config().max_payload;
    let info = file_info(path)?;
    check_packet_sizes(&info, max_payload)?;
    let chunk_size = max_payload - DATA_HEADER_LEN;
    let mut file = File::open(path)?;

    let started = Instant::now();
    log::info!("Sending start packet for {:?} ({} bytes)", info.name, info.size);
    session.send(&control_packet(C_START, &info)?)?;

    let mut buffer = vec![0u8; chunk_size];
    let mut n: u8 = 0;
    let mut sent: u64 = 0;
    loop {
        let count = read_chunk(&mut file, &mut buffer)?;
        if count == 0 {
            break;
        }
        session.send(&data_packet(n, &buffer[..count]))?;
        sent += count as u64;
        log::debug!("Sent data packet {} ({}/{} bytes)", n, sent, info.size);
        n = n.wrapping_add(1);
    }

    log::info!("Sending end packet");
    session.send(&control_packet(C_END, &info)?)?;

    Ok(TransferReport { bytes: sent, elapsed: started.elapsed(), baud_rate: session.config().baud_rate })
}

/// Fill `buf` as far as the file allows.
fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            count => filled += count,
        }
    }
    Ok(filled)
}

/// Next packet, riding out frames the link layer recovers from.
fn next_packet(session: &mut Session<Open>) -> Result<Vec<u8>, TransferError> {
    loop {
        match session.receive() {
            Ok(packet) => return Ok(packet),
            Err(e) if !e.is_fatal() => log::debug!("Waiting for retransmission: {}", e),
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn receive_file(session: &mut Session<Open>, output_dir: &Path) -> Result<(PathBuf, TransferReport), TransferError> {
    let start = loop {
        let packet = next_packet(session)?;
        match packet.first() {
            Some(&C_START) => break parse_control_packet(&packet)?,
            Some(&other) => log::warn!("Ignoring packet 0x{:02X} before start packet", other),
            None => log::warn!("Ignoring empty packet"),
        }
    };

    let started = Instant::now();
    let name = Path::new(&start.name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("received.bin"));
    let path = output_dir.join(name);
    log::info!("Receiving {:?} ({} bytes) into {}", start.name, start.size, path.display());

    let mut file = File::create(&path)?;
    let mut expected_n: u8 = 0;
    let mut received: u64 = 0;

    loop {
        let packet = next_packet(session)?;
        match packet.first() {
            Some(&C_DATA) => {
                let (n, data) = parse_data_packet(&packet)?;
                if n != expected_n {
                    return Err(TransferError::Malformed(format!("data packet {} out of order, expected {}", n, expected_n)));
                }
                file.write_all(data)?;
                received += data.len() as u64;
                log::debug!("Received data packet {} ({}/{} bytes)", n, received, start.size);
                expected_n = expected_n.wrapping_add(1);
            }
            Some(&C_END) => {
                let end = parse_control_packet(&packet)?;
                if end != start {
                    log::warn!("End packet {:?} differs from start packet {:?}", end, start);
                }
                break;
            }
            Some(&other) => {
                return Err(TransferError::Malformed(format!("unexpected packet type 0x{:02X}", other)));
            }
            None => return Err(TransferError::Malformed("empty packet".into())),
        }
    }

    file.flush()?;
    if received != start.size {
        return Err(TransferError::SizeMismatch { expected: start.size, received });
    }

    let report = TransferReport { bytes: received, elapsed: started.elapsed(), baud_rate: session.config().baud_rate };
    Ok((path, report))
}

// ============================================================================
// Tests
// ============================================================================
