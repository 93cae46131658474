//! Frame headers, the big-endian codec, and receiver-side path rules
//!
//! Everything here is pure: headers encode to and parse from byte buffers,
//! and the sanitization functions decide whether a wire-supplied path may
//! touch the filesystem. Socket I/O lives in `net`.

use crate::error::{Result, TransferError};
use crate::protocol::{
    DIR_HEADER_SIZE, DIR_MAGIC, FILE_HEADER_SIZE, FILE_MAGIC, MAX_PATH_LEN,
    TARGET_DIR_HEADER_SIZE, TARGET_DIR_MAGIC, TARGET_FILE_HEADER_SIZE, TARGET_FILE_MAGIC,
};

// Big-endian codec. All multi-byte integers on the wire go through these so
// serialized bytes are identical regardless of host endianness.

pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn u32_at(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_be_bytes(b)
}

pub fn u64_at(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_be_bytes(b)
}

/// The four frame variants, selected by the leading magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    File,
    FileWithTarget,
    Tree,
    TreeWithTarget,
}

impl FrameKind {
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            FILE_MAGIC => Some(FrameKind::File),
            TARGET_FILE_MAGIC => Some(FrameKind::FileWithTarget),
            DIR_MAGIC => Some(FrameKind::Tree),
            TARGET_DIR_MAGIC => Some(FrameKind::TreeWithTarget),
            _ => None,
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            FrameKind::File => FILE_MAGIC,
            FrameKind::FileWithTarget => TARGET_FILE_MAGIC,
            FrameKind::Tree => DIR_MAGIC,
            FrameKind::TreeWithTarget => TARGET_DIR_MAGIC,
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, FrameKind::Tree | FrameKind::TreeWithTarget)
    }

    pub fn has_target(self) -> bool {
        matches!(self, FrameKind::FileWithTarget | FrameKind::TreeWithTarget)
    }

    pub fn label(self) -> &'static str {
        match self {
            FrameKind::File => "file",
            FrameKind::FileWithTarget => "file+target",
            FrameKind::Tree => "tree",
            FrameKind::TreeWithTarget => "tree+target",
        }
    }
}

/// Header following FILE, and preceding every entry inside a tree frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub file_size: u64,
    pub name_len: u64,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.file_size.to_be_bytes());
        buf[8..16].copy_from_slice(&self.name_len.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8; FILE_HEADER_SIZE]) -> Self {
        FileHeader {
            file_size: u64_at(buf, 0),
            name_len: u64_at(buf, 8),
        }
    }

    /// The zero/zero sentinel terminating a legacy DIR frame.
    pub fn is_end_marker(&self) -> bool {
        self.file_size == 0 && self.name_len == 0
    }
}

/// Header following TARG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFileHeader {
    pub file_size: u64,
    pub name_len: u64,
    pub target_len: u64,
}

impl TargetFileHeader {
    pub fn encode(&self) -> [u8; TARGET_FILE_HEADER_SIZE] {
        let mut buf = [0u8; TARGET_FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.file_size.to_be_bytes());
        buf[8..16].copy_from_slice(&self.name_len.to_be_bytes());
        buf[16..24].copy_from_slice(&self.target_len.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8; TARGET_FILE_HEADER_SIZE]) -> Self {
        TargetFileHeader {
            file_size: u64_at(buf, 0),
            name_len: u64_at(buf, 8),
            target_len: u64_at(buf, 16),
        }
    }
}

/// Header following DIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirHeader {
    pub total_files: u64,
    pub total_size: u64,
    pub base_len: u64,
}

impl DirHeader {
    pub fn encode(&self) -> [u8; DIR_HEADER_SIZE] {
        let mut buf = [0u8; DIR_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.total_files.to_be_bytes());
        buf[8..16].copy_from_slice(&self.total_size.to_be_bytes());
        buf[16..24].copy_from_slice(&self.base_len.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8; DIR_HEADER_SIZE]) -> Self {
        DirHeader {
            total_files: u64_at(buf, 0),
            total_size: u64_at(buf, 8),
            base_len: u64_at(buf, 16),
        }
    }
}

/// Header following TDIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDirHeader {
    pub total_files: u64,
    pub total_size: u64,
    pub base_len: u64,
    pub target_len: u64,
}

impl TargetDirHeader {
    pub fn encode(&self) -> [u8; TARGET_DIR_HEADER_SIZE] {
        let mut buf = [0u8; TARGET_DIR_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.total_files.to_be_bytes());
        buf[8..16].copy_from_slice(&self.total_size.to_be_bytes());
        buf[16..24].copy_from_slice(&self.base_len.to_be_bytes());
        buf[24..32].copy_from_slice(&self.target_len.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8; TARGET_DIR_HEADER_SIZE]) -> Self {
        TargetDirHeader {
            total_files: u64_at(buf, 0),
            total_size: u64_at(buf, 8),
            base_len: u64_at(buf, 16),
            target_len: u64_at(buf, 24),
        }
    }
}

/// Validate a target-directory string received (or about to be sent) on the
/// wire. Returns `None` for the empty string, which means "current
/// directory" and requires no mkdir.
///
/// The `..` check is a substring match, not a component match: it also
/// rejects names like `file..txt`. That is deliberately broader than
/// necessary and must not be narrowed.
pub fn sanitize_target_dir(raw: &str) -> Result<Option<String>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(TransferError::PathRejected(format!(
            "target directory too long ({} bytes)",
            raw.len()
        )));
    }
    if raw.contains("..") {
        return Err(TransferError::PathRejected(format!(
            "traversal sequence in target directory {:?}",
            raw
        )));
    }
    if raw.starts_with('/') {
        return Err(TransferError::PathRejected(format!(
            "absolute target directory {:?}",
            raw
        )));
    }
    Ok(Some(raw.to_string()))
}

/// Validate a relative entry path inside a tree frame before it is joined
/// under the anchor directory. Separators are `/` on the wire; intermediate
/// directories are created by the receiver.
pub fn validate_entry_path(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(TransferError::PathRejected("empty entry path".to_string()));
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(TransferError::PathRejected(format!(
            "entry path too long ({} bytes)",
            raw.len()
        )));
    }
    if raw.contains("..") {
        return Err(TransferError::PathRejected(format!(
            "traversal sequence in entry path {:?}",
            raw
        )));
    }
    if raw.starts_with('/') {
        return Err(TransferError::PathRejected(format!(
            "absolute entry path {:?}",
            raw
        )));
    }
    Ok(())
}

/// Validate the filename of a non-tree FILE/TARG frame. The sender already
/// strips directory components, so any separator here is hostile.
pub fn validate_single_filename(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(TransferError::PathRejected("empty filename".to_string()));
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(TransferError::PathRejected(format!(
            "filename too long ({} bytes)",
            raw.len()
        )));
    }
    if raw.contains('/') || raw.contains('\\') {
        return Err(TransferError::PathRejected(format!(
            "separator in filename {:?}",
            raw
        )));
    }
    Ok(())
}

/// Final path component after stripping both `/` and `\` separators, the
/// name a single-file frame travels under.
pub fn basename(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAGIC_SIZE;

    #[test]
    fn magics_spell_ascii() {
        assert_eq!(&FILE_MAGIC.to_be_bytes(), b"FILE");
        assert_eq!(&DIR_MAGIC.to_be_bytes(), b"DIR ");
        assert_eq!(&TARGET_FILE_MAGIC.to_be_bytes(), b"TARG");
        assert_eq!(&TARGET_DIR_MAGIC.to_be_bytes(), b"TDIR");
        assert_eq!(MAGIC_SIZE, 4);
    }

    #[test]
    fn frame_kind_dispatch() {
        assert_eq!(FrameKind::from_magic(FILE_MAGIC), Some(FrameKind::File));
        assert_eq!(FrameKind::from_magic(DIR_MAGIC), Some(FrameKind::Tree));
        assert_eq!(
            FrameKind::from_magic(TARGET_FILE_MAGIC),
            Some(FrameKind::FileWithTarget)
        );
        assert_eq!(
            FrameKind::from_magic(TARGET_DIR_MAGIC),
            Some(FrameKind::TreeWithTarget)
        );
        assert_eq!(FrameKind::from_magic(0), None);
        assert_eq!(FrameKind::from_magic(0xDEAD_BEEF), None);
    }

    #[test]
    fn file_header_layout_is_big_endian() {
        // The S1 seed: 10-byte file, 9-byte name
        let hdr = FileHeader {
            file_size: 10,
            name_len: 9,
        };
        let bytes = hdr.encode();
        assert_eq!(
            bytes,
            [0, 0, 0, 0, 0, 0, 0, 0x0A, 0, 0, 0, 0, 0, 0, 0, 0x09]
        );
        assert_eq!(FileHeader::parse(&bytes), hdr);
    }

    #[test]
    fn file_header_round_trips_large_sizes() {
        let hdr = FileHeader {
            file_size: u64::MAX - 7,
            name_len: 1 << 40,
        };
        assert_eq!(FileHeader::parse(&hdr.encode()), hdr);
    }

    #[test]
    fn target_file_header_round_trip() {
        let hdr = TargetFileHeader {
            file_size: 1,
            name_len: 5,
            target_len: 7,
        };
        let bytes = hdr.encode();
        assert_eq!(bytes[7], 1);
        assert_eq!(bytes[15], 5);
        assert_eq!(bytes[23], 7);
        assert_eq!(TargetFileHeader::parse(&bytes), hdr);
    }

    #[test]
    fn dir_headers_round_trip() {
        let hdr = DirHeader {
            total_files: 3,
            total_size: 5,
            base_len: 4,
        };
        assert_eq!(DirHeader::parse(&hdr.encode()), hdr);

        let thdr = TargetDirHeader {
            total_files: 3,
            total_size: 5,
            base_len: 4,
            target_len: 3,
        };
        assert_eq!(TargetDirHeader::parse(&thdr.encode()), thdr);
    }

    #[test]
    fn end_marker_detection() {
        assert!(FileHeader {
            file_size: 0,
            name_len: 0
        }
        .is_end_marker());
        assert!(!FileHeader {
            file_size: 0,
            name_len: 1
        }
        .is_end_marker());
        assert!(!FileHeader {
            file_size: 1,
            name_len: 0
        }
        .is_end_marker());
    }

    #[test]
    fn codec_helpers_are_big_endian() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 0x0102_0304);
        put_u64(&mut buf, 0x1122_3344_5566_7788);
        assert_eq!(
            buf,
            [1, 2, 3, 4, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
        assert_eq!(u32_at(&buf, 0), 0x0102_0304);
        assert_eq!(u64_at(&buf, 4), 0x1122_3344_5566_7788);
    }

    #[test]
    fn sanitize_accepts_relative_targets() {
        assert_eq!(sanitize_target_dir("").unwrap(), None);
        assert_eq!(
            sanitize_target_dir("out/sub").unwrap(),
            Some("out/sub".to_string())
        );
        assert_eq!(
            sanitize_target_dir("downloads").unwrap(),
            Some("downloads".to_string())
        );
    }

    #[test]
    fn sanitize_rejects_absolute_targets() {
        let err = sanitize_target_dir("/etc").unwrap_err();
        assert_eq!(err.name(), "PathRejected");
        assert!(sanitize_target_dir("//tmp/x").is_err());
    }

    #[test]
    fn sanitize_rejects_traversal_anywhere() {
        assert!(sanitize_target_dir("a/../../b").is_err());
        assert!(sanitize_target_dir("..").is_err());
        // Substring match is intentionally broader than component match
        assert!(sanitize_target_dir("file..txt").is_err());
    }

    #[test]
    fn sanitize_rejects_overlong_targets() {
        let long = "a/".repeat(MAX_PATH_LEN);
        assert!(sanitize_target_dir(&long).is_err());
    }

    #[test]
    fn entry_path_rules() {
        assert!(validate_entry_path("x").is_ok());
        assert!(validate_entry_path("d/e/z").is_ok());
        assert!(validate_entry_path("").is_err());
        assert!(validate_entry_path("/abs").is_err());
        assert!(validate_entry_path("d/../z").is_err());
    }

    #[test]
    fn single_filename_rules() {
        assert!(validate_single_filename("hello.txt").is_ok());
        assert!(validate_single_filename("").is_err());
        assert!(validate_single_filename("a/b").is_err());
        assert!(validate_single_filename("a\\b").is_err());
    }

    #[test]
    fn basename_strips_both_separators() {
        assert_eq!(basename("/path/to/file.txt"), "file.txt");
        assert_eq!(basename("file.txt"), "file.txt");
        assert_eq!(basename("dir\\sub\\file.txt"), "file.txt");
        assert_eq!(basename("mixed/dir\\file.txt"), "file.txt");
    }
}
