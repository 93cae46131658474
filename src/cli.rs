//! Shared CLI fragments for the nettf binary

use crate::protocol::DEFAULT_PORT;
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
pub struct DiscoverOpts {
    /// Probe timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout: u64,

    /// Port probed on each neighbor
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

#[derive(Clone, Debug, Parser)]
pub struct ReceiveOpts {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory received files are written under
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Append a JSONL transfer log at this path
    #[arg(long)]
    pub log: Option<PathBuf>,
}

#[derive(Clone, Debug, Parser)]
pub struct SendOpts {
    /// Receiver IPv4 address
    pub target: Ipv4Addr,

    /// File or directory to send
    pub path: PathBuf,

    /// Optional target subdirectory on the receiver
    pub target_dir: Option<String>,

    /// Receiver port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Append a JSONL transfer log at this path
    #[arg(long)]
    pub log: Option<PathBuf>,
}
