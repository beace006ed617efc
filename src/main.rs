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

use std::path::PathBuf;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serlink::config::{
    parse_data_bits, parse_parity, parse_stop_bits, DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_RETRIES,
};
use serlink::transfer::{check_packet_sizes, file_info, receive_file, send_file};
use serlink::{LineSettings, Role, SessionConfig};

#[derive(Parser)]
#[command(name = "serlink")]
#[command(about = "Stop-and-wait link layer file transfer over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Transmissions of a frame before giving up
    #[arg(short, long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Seconds to wait for a reply before retransmitting
    #[arg(short, long, default_value = "3", value_name = "SECS")]
    timeout: u64,

    /// Maximum packet size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD, value_name = "BYTES")]
    max_payload: usize,

    /// Link role (tx/initiator or rx/responder). Defaults to tx for send, rx for receive
    #[arg(long)]
    role: Option<Role>,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect as initiator and send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Wait for a connection and receive a file
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let line = LineSettings {
        data_bits: parse_data_bits(cli.data_bits)?,
        parity: parse_parity(&cli.parity)?,
        stop_bits: parse_stop_bits(cli.stop_bits)?,
    };

    let role = cli.role.unwrap_or(match cli.command {
        Commands::Send { .. } => Role::Initiator,
        Commands::Receive { .. } => Role::Responder,
    });

    let config = SessionConfig::new(role, cli.port.clone())
        .with_baud_rate(cli.baud)
        .with_line(line)
        .with_max_retries(cli.retries)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_max_payload(cli.max_payload);

    info!("Opening serial port: {} as {}", cli.port, role);
    info!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, line.data_bits, line.parity, line.stop_bits);

    match cli.command {
        Commands::Send { file } => {
            if !file.exists() {
                bail!("File not found: {}", file.display());
            }
            let info = file_info(&file).context("Could not read file")?;
            check_packet_sizes(&info, cli.max_payload)
                .context("File name does not fit in --max-payload")?;
            let mut session = serlink::open(config).context("Could not establish connection")?;
            info!("Sending file: {}", file.display());
            let report = send_file(&mut session, &file).context("Send failed")?;
            session.close().context("Disconnect failed")?;
            report.log();
            info!("File sent successfully!");
        }
        Commands::Receive { output_dir } => {
            if !output_dir.is_dir() {
                bail!("Output directory not found: {}", output_dir.display());
            }
            let mut session = serlink::open(config).context("Could not establish connection")?;
            let (path, report) = receive_file(&mut session, &output_dir).context("Receive failed")?;
            session.close().context("Disconnect failed")?;
            report.log();
            info!("File received successfully: {}", path.display());
        }
    }

    Ok(())
}
