//! Framed transfer engine over a blocking TCP stream
//!
//! Both halves of the four-frame protocol live here: the sender functions
//! build headers and stream chunked bodies, the receiver functions dispatch
//! on the leading magic and reconstruct files under a root directory, and
//! the byte courier underneath guarantees exactly-N-byte semantics on a
//! stream that promises none. One connection carries one frame; the serve
//! loop hands each accepted socket to the dispatcher and returns to accept.

use crate::adaptive::constants::MAX_CHUNK_SIZE;
use crate::adaptive::AdaptiveState;
use crate::error::{Result, TransferError};
use crate::frame::{
    basename, put_u32, sanitize_target_dir, validate_entry_path, validate_single_filename,
    DirHeader, FileHeader, FrameKind, TargetDirHeader, TargetFileHeader,
};
use crate::fs_enum::{snapshot_tree, TreeEntry};
use crate::logger::Logger;
use crate::progress::{human_bytes, human_duration, human_speed, TransferProgress};
use crate::protocol::{
    DIR_HEADER_SIZE, FILE_HEADER_SIZE, MAGIC_SIZE, MAX_PATH_LEN, TARGET_DIR_HEADER_SIZE,
    TARGET_FILE_HEADER_SIZE,
};
use crate::signals::{self, Shutdown};
use anyhow::Context;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};

/// Bodies below this size skip the progress bar.
const PROGRESS_THRESHOLD: u64 = 1024 * 1024;

/// Outcome of one completed frame, for summaries and log records.
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    pub files: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Byte courier

/// Write the whole buffer, looping over partial sends. A zero-length send
/// means the peer went away.
pub fn send_all(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < data.len() {
        match stream.write(&data[sent..]) {
            Ok(0) => return Err(TransferError::PeerClosed),
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Transport(e)),
        }
    }
    Ok(())
}

/// Fill the whole buffer, looping over partial reads. A zero-length read is
/// EOF, reported as [`TransferError::PeerClosed`].
pub fn recv_all(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut received = 0;
    while received < buf.len() {
        match stream.read(&mut buf[received..]) {
            Ok(0) => return Err(TransferError::PeerClosed),
            Ok(n) => received += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Transport(e)),
        }
    }
    Ok(())
}

/// Allocate a body/name buffer, surfacing allocation failure instead of
/// aborting. Lengths come off the wire, so they are never trusted blindly.
fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| TransferError::ResourceExhausted(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Disable Nagle and enlarge the kernel buffers on both directions.
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use crate::protocol::SOCKET_BUFFER_BYTES;
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        let sz: libc::c_int = SOCKET_BUFFER_BYTES;
        let p = &sz as *const _ as *const libc::c_void;
        let len = std::mem::size_of_val(&sz) as libc::socklen_t;
        unsafe {
            let _ = libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, p, len);
            let _ = libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, p, len);
        }
    }
}

/// Poll the shutdown counter between courier calls. The first Ctrl+C prompts
/// once and lets the in-flight transfer finish; the second aborts it.
fn poll_shutdown() -> Result<()> {
    match signals::state() {
        Shutdown::Continue => Ok(()),
        Shutdown::RequestedOnce => {
            eprintln!("\nShutdown requested. Press Ctrl+C again to force exit...");
            signals::acknowledge();
            Ok(())
        }
        Shutdown::Forced => Err(TransferError::Interrupted),
    }
}

/// Read a length-prefixed path string off the wire. The length cap is
/// enforced before any allocation happens.
fn read_wire_string(stream: &mut TcpStream, len: u64, what: &str) -> Result<String> {
    if len > MAX_PATH_LEN as u64 {
        return Err(TransferError::PathRejected(format!(
            "{} length {} exceeds {} bytes",
            what, len, MAX_PATH_LEN
        )));
    }
    if len == 0 {
        return Ok(String::new());
    }
    let mut buf = alloc_buffer(len as usize)?;
    recv_all(stream, &mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| TransferError::HeaderInvalid(format!("{} is not valid UTF-8", what)))
}

fn body_progress(total: u64, label: &str) -> Option<TransferProgress> {
    if total >= PROGRESS_THRESHOLD {
        Some(TransferProgress::new(total, label))
    } else {
        None
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Sender

/// Send `source` over an established connection, dispatching on whether it
/// is a regular file or a directory tree.
pub fn send_path(
    stream: &mut TcpStream,
    source: &Path,
    target_dir: Option<&str>,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let meta = fs::metadata(source).map_err(TransferError::File)?;
    if meta.is_dir() {
        send_tree(stream, source, target_dir, logger)
    } else {
        send_file(stream, source, target_dir, logger)
    }
}

/// Send a single regular file as a FILE frame, or a TARG frame when a
/// non-empty target subdirectory is requested.
pub fn send_file(
    stream: &mut TcpStream,
    path: &Path,
    target_dir: Option<&str>,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    // Sanitize before any wire traffic so a bad target aborts cleanly
    let target = sanitize_target_dir(target_dir.unwrap_or(""))?;

    let meta = fs::metadata(path).map_err(TransferError::File)?;
    let file_size = meta.len();

    let lossy = path.to_string_lossy();
    let name = basename(&lossy).to_string();
    if name.is_empty() {
        return Err(TransferError::PathRejected(format!(
            "no filename in source path {:?}",
            lossy
        )));
    }

    let mut file = File::open(path).map_err(TransferError::File)?;

    let kind = if target.is_some() {
        FrameKind::FileWithTarget
    } else {
        FrameKind::File
    };
    logger.frame_start("send", kind.label(), &name);
    let start = Instant::now();

    let mut head =
        Vec::with_capacity(MAGIC_SIZE + TARGET_FILE_HEADER_SIZE + name.len() + MAX_PATH_LEN);
    put_u32(&mut head, kind.magic());
    match &target {
        Some(t) => {
            let header = TargetFileHeader {
                file_size,
                name_len: name.len() as u64,
                target_len: t.len() as u64,
            };
            head.extend_from_slice(&header.encode());
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(t.as_bytes());
        }
        None => {
            let header = FileHeader {
                file_size,
                name_len: name.len() as u64,
            };
            head.extend_from_slice(&header.encode());
            head.extend_from_slice(name.as_bytes());
        }
    }
    send_all(stream, &head)?;

    let mut adaptive = AdaptiveState::new(file_size);
    let progress = body_progress(file_size, &name);
    send_file_body(stream, &mut file, file_size, &mut adaptive, progress.as_ref())?;
    drop(progress);

    let stats = TransferStats {
        files: 1,
        bytes: file_size,
        elapsed: start.elapsed(),
    };
    logger.frame_done(kind.label(), &name, 1, file_size, stats.elapsed.as_secs_f64());
    Ok(stats)
}

/// Send a directory tree as a DIR frame, or a TDIR frame when a non-empty
/// target subdirectory is requested. The tree is snapshotted up front; the
/// snapshot backs both the header totals and the entry stream.
pub fn send_tree(
    stream: &mut TcpStream,
    dir: &Path,
    target_dir: Option<&str>,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let target = sanitize_target_dir(target_dir.unwrap_or(""))?;

    let lossy = dir.to_string_lossy();
    let base = basename(lossy.trim_end_matches(['/', '\\'])).to_string();
    if base.is_empty() {
        return Err(TransferError::PathRejected(format!(
            "no base name in source path {:?}",
            lossy
        )));
    }

    let snapshot = snapshot_tree(dir)?;

    let kind = if target.is_some() {
        FrameKind::TreeWithTarget
    } else {
        FrameKind::Tree
    };
    logger.frame_start("send", kind.label(), &base);
    let start = Instant::now();

    let mut head =
        Vec::with_capacity(MAGIC_SIZE + TARGET_DIR_HEADER_SIZE + base.len() + MAX_PATH_LEN);
    put_u32(&mut head, kind.magic());
    match &target {
        Some(t) => {
            let header = TargetDirHeader {
                total_files: snapshot.total_files(),
                total_size: snapshot.total_size,
                base_len: base.len() as u64,
                target_len: t.len() as u64,
            };
            head.extend_from_slice(&header.encode());
            head.extend_from_slice(base.as_bytes());
            head.extend_from_slice(t.as_bytes());
        }
        None => {
            let header = DirHeader {
                total_files: snapshot.total_files(),
                total_size: snapshot.total_size,
                base_len: base.len() as u64,
            };
            head.extend_from_slice(&header.encode());
            head.extend_from_slice(base.as_bytes());
        }
    }
    send_all(stream, &head)?;

    // One chunk controller spans the whole tree so the rate estimate
    // survives across small entries
    let mut adaptive = AdaptiveState::new(snapshot.total_size);
    let progress = body_progress(snapshot.total_size, &base);
    for entry in &snapshot.entries {
        poll_shutdown()?;
        send_tree_entry(stream, entry, &mut adaptive, progress.as_ref())?;
    }

    if kind == FrameKind::Tree {
        // Legacy DIR framing ends with a zero/zero entry header
        let sentinel = FileHeader {
            file_size: 0,
            name_len: 0,
        };
        send_all(stream, &sentinel.encode())?;
    }
    drop(progress);

    let stats = TransferStats {
        files: snapshot.total_files(),
        bytes: snapshot.total_size,
        elapsed: start.elapsed(),
    };
    logger.frame_done(
        kind.label(),
        &base,
        stats.files,
        stats.bytes,
        stats.elapsed.as_secs_f64(),
    );
    Ok(stats)
}

fn send_tree_entry(
    stream: &mut TcpStream,
    entry: &TreeEntry,
    adaptive: &mut AdaptiveState,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    let mut file = File::open(&entry.abs_path).map_err(TransferError::File)?;

    let header = FileHeader {
        file_size: entry.size,
        name_len: entry.rel_path.len() as u64,
    };
    let mut head = Vec::with_capacity(FILE_HEADER_SIZE + entry.rel_path.len());
    head.extend_from_slice(&header.encode());
    head.extend_from_slice(entry.rel_path.as_bytes());
    send_all(stream, &head)?;

    send_file_body(stream, &mut file, entry.size, adaptive, progress)
}

/// Stream exactly `declared` bytes of file content. The stat'd size is
/// authoritative: early EOF is a [`TransferError::ShortRead`], and a file
/// that grew is cut off at the declared length.
fn send_file_body(
    stream: &mut TcpStream,
    file: &mut File,
    declared: u64,
    adaptive: &mut AdaptiveState,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    let mut buf = alloc_buffer(MAX_CHUNK_SIZE)?;
    let mut remaining = declared;
    while remaining > 0 {
        poll_shutdown()?;
        let want = (remaining.min(adaptive.chunk_size() as u64)) as usize;
        let got = read_up_to(file, &mut buf[..want]).map_err(TransferError::File)?;
        if got == 0 {
            return Err(TransferError::ShortRead {
                expected: declared,
                got: declared - remaining,
            });
        }

        let clock = Instant::now();
        send_all(stream, &buf[..got])?;
        adaptive.update(got, clock.elapsed().as_secs_f64());

        remaining -= got as u64;
        if let Some(p) = progress {
            p.inc(got as u64);
            p.set_chunk(adaptive.chunk_size());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Receiver

/// Receive one frame from an accepted connection, writing everything under
/// `root`. Consumes exactly the 4 magic bytes before dispatching; all
/// further decoding belongs to the selected handler.
pub fn receive_frame(
    stream: &mut TcpStream,
    root: &Path,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let mut magic_buf = [0u8; MAGIC_SIZE];
    recv_all(stream, &mut magic_buf)?;
    let magic = u32::from_be_bytes(magic_buf);

    let kind = FrameKind::from_magic(magic).ok_or(TransferError::UnknownFrame(magic))?;
    if kind.is_tree() {
        recv_tree_frame(stream, root, kind, logger)
    } else {
        recv_file_frame(stream, root, kind, logger)
    }
}

fn recv_file_frame(
    stream: &mut TcpStream,
    root: &Path,
    kind: FrameKind,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let (file_size, name_len, target_len) = if kind.has_target() {
        let mut buf = [0u8; TARGET_FILE_HEADER_SIZE];
        recv_all(stream, &mut buf)?;
        let header = TargetFileHeader::parse(&buf);
        (header.file_size, header.name_len, header.target_len)
    } else {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        recv_all(stream, &mut buf)?;
        let header = FileHeader::parse(&buf);
        (header.file_size, header.name_len, 0)
    };

    let name = read_wire_string(stream, name_len, "filename")?;
    validate_single_filename(&name)?;

    let target = if kind.has_target() {
        let raw = read_wire_string(stream, target_len, "target directory")?;
        sanitize_target_dir(&raw)?
    } else {
        None
    };

    logger.frame_start("recv", kind.label(), &name);
    let start = Instant::now();

    let dest = match &target {
        Some(t) => {
            let dir = root.join(t);
            fs::create_dir_all(&dir).map_err(TransferError::File)?;
            dir.join(&name)
        }
        None => root.join(&name),
    };

    // Existing files are overwritten without prompting
    let mut file = File::create(&dest).map_err(TransferError::File)?;

    let mut adaptive = AdaptiveState::new(file_size);
    let progress = body_progress(file_size, &name);
    recv_file_body(stream, &mut file, file_size, &mut adaptive, progress.as_ref())?;
    drop(progress);

    let stats = TransferStats {
        files: 1,
        bytes: file_size,
        elapsed: start.elapsed(),
    };
    logger.frame_done(kind.label(), &name, 1, file_size, stats.elapsed.as_secs_f64());
    Ok(stats)
}

fn recv_tree_frame(
    stream: &mut TcpStream,
    root: &Path,
    kind: FrameKind,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let (total_files, total_size, base_len, target_len) = if kind.has_target() {
        let mut buf = [0u8; TARGET_DIR_HEADER_SIZE];
        recv_all(stream, &mut buf)?;
        let header = TargetDirHeader::parse(&buf);
        (
            header.total_files,
            header.total_size,
            header.base_len,
            header.target_len,
        )
    } else {
        let mut buf = [0u8; DIR_HEADER_SIZE];
        recv_all(stream, &mut buf)?;
        let header = DirHeader::parse(&buf);
        (header.total_files, header.total_size, header.base_len, 0)
    };

    let base = read_wire_string(stream, base_len, "base directory")?;
    validate_entry_path(&base)?;

    let target = if kind.has_target() {
        let raw = read_wire_string(stream, target_len, "target directory")?;
        sanitize_target_dir(&raw)?
    } else {
        None
    };

    logger.frame_start("recv", kind.label(), &base);
    let start = Instant::now();

    let anchor = match &target {
        Some(t) => root.join(t).join(&base),
        None => root.join(&base),
    };
    fs::create_dir_all(&anchor).map_err(TransferError::File)?;

    let mut adaptive = AdaptiveState::new(total_size);
    let progress = body_progress(total_size, &base);
    let mut files_received = 0u64;
    let mut bytes_received = 0u64;

    match kind {
        FrameKind::Tree => {
            // Legacy framing: entries until the zero/zero sentinel. Bytes
            // after the sentinel belong to the caller, not this frame.
            loop {
                match recv_tree_entry(stream, &anchor, &mut adaptive, progress.as_ref())? {
                    Some(bytes) => {
                        files_received += 1;
                        bytes_received += bytes;
                    }
                    None => break,
                }
            }
        }
        FrameKind::TreeWithTarget => {
            // Counted framing: exactly total_files entries, no sentinel
            for _ in 0..total_files {
                match recv_tree_entry(stream, &anchor, &mut adaptive, progress.as_ref())? {
                    Some(bytes) => {
                        files_received += 1;
                        bytes_received += bytes;
                    }
                    None => {
                        return Err(TransferError::HeaderInvalid(
                            "zero entry header inside counted tree".to_string(),
                        ))
                    }
                }
            }
        }
        _ => unreachable!("file kinds handled by recv_file_frame"),
    }
    drop(progress);

    let stats = TransferStats {
        files: files_received,
        bytes: bytes_received,
        elapsed: start.elapsed(),
    };
    logger.frame_done(
        kind.label(),
        &base,
        files_received,
        bytes_received,
        stats.elapsed.as_secs_f64(),
    );
    Ok(stats)
}

/// Receive one entry of a tree frame. Returns `None` on the zero/zero
/// sentinel, `Some(bytes)` after a stored entry.
fn recv_tree_entry(
    stream: &mut TcpStream,
    anchor: &Path,
    adaptive: &mut AdaptiveState,
    progress: Option<&TransferProgress>,
) -> Result<Option<u64>> {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    recv_all(stream, &mut buf)?;
    let header = FileHeader::parse(&buf);
    if header.is_end_marker() {
        return Ok(None);
    }
    if header.name_len == 0 {
        return Err(TransferError::HeaderInvalid(
            "entry with empty path and nonzero size".to_string(),
        ));
    }

    let rel = read_wire_string(stream, header.name_len, "entry path")?;
    validate_entry_path(&rel)?;

    let dest = anchor.join(&rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(TransferError::File)?;
    }
    let mut file = File::create(&dest).map_err(TransferError::File)?;
    recv_file_body(stream, &mut file, header.file_size, adaptive, progress)?;
    Ok(Some(header.file_size))
}

fn recv_file_body(
    stream: &mut TcpStream,
    file: &mut File,
    size: u64,
    adaptive: &mut AdaptiveState,
    progress: Option<&TransferProgress>,
) -> Result<()> {
    let mut buf = alloc_buffer(MAX_CHUNK_SIZE)?;
    let mut received = 0u64;
    while received < size {
        poll_shutdown()?;
        let want = ((size - received).min(adaptive.chunk_size() as u64)) as usize;

        let clock = Instant::now();
        recv_all(stream, &mut buf[..want])?;
        file.write_all(&buf[..want]).map_err(TransferError::File)?;
        adaptive.update(want, clock.elapsed().as_secs_f64());

        received += want as u64;
        if let Some(p) = progress {
            p.inc(want as u64);
            p.set_chunk(adaptive.chunk_size());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Connection plumbing

/// Connect to a receiver and tune the socket.
pub fn connect(addr: SocketAddr) -> anyhow::Result<TcpStream> {
    let stream = TcpStream::connect(addr).with_context(|| format!("connect {}", addr))?;
    tune_socket(&stream);
    Ok(stream)
}

/// Accept loop for the receive side. One connection is served at a time;
/// each carries exactly one frame, after which the socket is closed and the
/// loop returns to accept.
pub fn serve(bind: &str, root: &Path, logger: &dyn Logger) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).with_context(|| format!("bind {}", bind))?;
    println!(
        "Listening on {} (receiving into {})",
        bind,
        root.display()
    );
    println!("Press Ctrl+C to stop the server\n");

    loop {
        match signals::state() {
            Shutdown::Forced => {
                eprintln!("Forced exit. Closing server.");
                return Err(TransferError::Interrupted.into());
            }
            Shutdown::RequestedOnce => {
                eprintln!("Shutdown requested. Press Ctrl+C again to force exit...");
                signals::acknowledge();
            }
            Shutdown::Continue => {}
        }

        let (mut stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                eprintln!("accept error: {}", e);
                continue;
            }
        };
        tune_socket(&stream);
        println!("Connection established from {}", peer);

        match receive_frame(&mut stream, root, logger) {
            Ok(stats) => {
                println!(
                    "Transfer complete: {} file(s), {} in {} ({})",
                    stats.files,
                    human_bytes(stats.bytes),
                    human_duration(stats.elapsed),
                    human_speed(stats.bytes, stats.elapsed),
                );
            }
            Err(TransferError::Interrupted) => {
                logger.error("receive", "Interrupted", "transfer aborted by user");
                eprintln!("Forced exit! Received data may be incomplete.");
                return Err(TransferError::Interrupted.into());
            }
            Err(e) => {
                logger.error("receive", e.name(), &e.to_string());
                eprintln!("[{}] {}", e.name(), e);
            }
        }
        println!("Waiting for next connection...\n");
    }
}
