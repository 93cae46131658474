//! nettf - peer-to-peer LAN file and directory transfer
//!
//! Three subcommands: `discover` scans the LAN for receivers, `receive`
//! listens for incoming frames, `send` pushes a file or directory to a
//! receiver, optionally redirected into a target subdirectory.

use anyhow::Result;
use clap::{Parser, Subcommand};
use nettf::cli::{DiscoverOpts, ReceiveOpts, SendOpts};
use nettf::logger::{JsonlLogger, Logger, NoopLogger};
use nettf::progress::{human_bytes, human_duration, human_speed};
use nettf::{discovery, net, signals};
use std::net::{SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "nettf",
    version,
    about = "Peer-to-peer LAN file and directory transfer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the local network for transfer peers
    Discover(DiscoverOpts),
    /// Listen for incoming transfers
    Receive(ReceiveOpts),
    /// Send a file or directory to a receiver
    Send(SendOpts),
}

fn make_logger(path: Option<&PathBuf>) -> Result<Box<dyn Logger>> {
    Ok(match path {
        Some(p) => Box::new(JsonlLogger::new(p)?),
        None => Box::new(NoopLogger),
    })
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Discover(opts) => {
            let timeout = Duration::from_millis(opts.timeout);
            let devices = discovery::discover(opts.port, timeout)?;
            discovery::print_devices(&devices, opts.port);
            Ok(())
        }
        Command::Receive(opts) => {
            signals::install()?;
            let logger = make_logger(opts.log.as_ref())?;
            net::serve(
                &format!("0.0.0.0:{}", opts.port),
                &opts.root,
                logger.as_ref(),
            )
        }
        Command::Send(opts) => {
            signals::install()?;
            let logger = make_logger(opts.log.as_ref())?;

            let addr = SocketAddr::from(SocketAddrV4::new(opts.target, opts.port));
            println!("Connecting to {}...", addr);
            let mut stream = net::connect(addr)?;
            println!("Connected. Sending {}...", opts.path.display());

            let stats = net::send_path(
                &mut stream,
                &opts.path,
                opts.target_dir.as_deref(),
                logger.as_ref(),
            )
            .map_err(|e| {
                logger.error("send", e.name(), &e.to_string());
                anyhow::anyhow!("[{}] {}", e.name(), e)
            })?;

            println!(
                "Sent {} file(s), {} in {} ({})",
                stats.files,
                human_bytes(stats.bytes),
                human_duration(stats.elapsed),
                human_speed(stats.bytes, stats.elapsed),
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
