//! NETTF library
//!
//! Peer-to-peer LAN transfer over a single TCP stream: a length-prefixed,
//! magic-tagged framing for files and directory trees, with an adaptive
//! chunk-size controller that retunes transfer granularity from observed
//! throughput.

pub mod adaptive;
pub mod cli;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod fs_enum;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod signals;
