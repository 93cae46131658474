//! Shared wire constants for the NETTF framed transport

// Frame magics, transmitted as big-endian u32. The ASCII spellings are part
// of the wire format and must stay stable across versions.
pub const FILE_MAGIC: u32 = 0x4649_4C45; // "FILE"
pub const DIR_MAGIC: u32 = 0x4449_5220; // "DIR "
pub const TARGET_FILE_MAGIC: u32 = 0x5441_5247; // "TARG"
pub const TARGET_DIR_MAGIC: u32 = 0x5444_4952; // "TDIR"

pub const MAGIC_SIZE: usize = 4;

// Fixed header sizes following each magic
pub const FILE_HEADER_SIZE: usize = 16;
pub const TARGET_FILE_HEADER_SIZE: usize = 24;
pub const DIR_HEADER_SIZE: usize = 24;
pub const TARGET_DIR_HEADER_SIZE: usize = 32;

/// Longest path-like string accepted off the wire (filenames, relative entry
/// paths, target directories). Anything larger is rejected before allocation.
pub const MAX_PATH_LEN: usize = 4096;

/// Default listening port for the receive side and the discovery probe.
pub const DEFAULT_PORT: u16 = 9876;

/// Socket buffer size requested on both ends (SO_SNDBUF / SO_RCVBUF).
pub const SOCKET_BUFFER_BYTES: i32 = 4 * 1024 * 1024;
