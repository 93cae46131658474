use std::io;
use thiserror::Error;

/// Failure taxonomy for the transfer engine. Variant names are stable: logs
/// and tests key on [`TransferError::name`].
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("file error: {0}")]
    File(#[source] io::Error),

    #[error("path rejected: {0}")]
    PathRejected(String),

    #[error("unknown frame magic 0x{0:08X}")]
    UnknownFrame(u32),

    #[error("interrupted by user")]
    Interrupted,

    #[error("source truncated: declared {expected} bytes, read {got}")]
    ShortRead { expected: u64, got: u64 },

    #[error("invalid header: {0}")]
    HeaderInvalid(String),

    #[error("allocation of {0} bytes failed")]
    ResourceExhausted(usize),
}

impl TransferError {
    /// Stable tag used in log records and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TransferError::Transport(_) => "TransportError",
            TransferError::PeerClosed => "PeerClosed",
            TransferError::File(_) => "FileError",
            TransferError::PathRejected(_) => "PathRejected",
            TransferError::UnknownFrame(_) => "UnknownFrame",
            TransferError::Interrupted => "Interrupted",
            TransferError::ShortRead { .. } => "ShortRead",
            TransferError::HeaderInvalid(_) => "HeaderInvalid",
            TransferError::ResourceExhausted(_) => "ResourceExhausted",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
