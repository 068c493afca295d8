//! APK signing certificate extraction
//!
//! A v2/v3 signed APK is laid out as
//!
//! ```text
//! +---------------+
//! | zip content   |
//! +---------------+
//! | signing block |
//! +---------------+
//! | central dir   |
//! +---------------+
//! | EOCD          |
//! +---------------+
//! ```
//!
//! The end of central directory record points at the central directory,
//! which is immediately preceded by the signing block. The first
//! certificate of the first signer of the v2 scheme block is returned.
//!
//! Every failure yields an empty certificate; callers treat that as
//! unverifiable.

use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;

const EOCD_MAGIC: u32 = 0x0605_4b50;
const EOCD_SIZE: u64 = 22;
const MAX_COMMENT_SIZE: u64 = 0xffff;

const SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";
/// Size of the trailing `block_size` field plus the magic
const SIGNING_BLOCK_FOOTER: u64 = 8 + 16;

const SIGNATURE_SCHEME_V2: u32 = 0x7109_871a;

/// Extract the signing certificate of an APK.
///
/// With `min_version`, the archive comment must hold a version number no
/// lower than it. Returns an empty vector on any mismatch.
pub fn read_certificate<R: Read + Seek>(reader: &mut R, min_version: Option<u32>) -> Vec<u8> {
    match find_certificate(reader, min_version) {
        Ok(Some(cert)) => cert,
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!("Unable to read signing block: {}", e);
            Vec::new()
        }
    }
}

fn find_certificate<R: Read + Seek>(r: &mut R, min_version: Option<u32>) -> io::Result<Option<Vec<u8>>> {
    let Some(eocd) = find_eocd(r)? else {
        debug!("End of central directory not found");
        return Ok(None);
    };

    if let Some(min) = min_version {
        let version = parse_version(&eocd.comment);
        match version {
            Some(v) if v >= min => {}
            _ => {
                debug!("Archive version {:?} is older than {}", version, min);
                return Ok(None);
            }
        }
    }

    let cd_off = u64::from(eocd.central_dir_off);
    let Some(footer) = cd_off.checked_sub(SIGNING_BLOCK_FOOTER) else {
        return Ok(None);
    };
    r.seek(SeekFrom::Start(footer))?;
    let block_size = read_u64(r)?;
    let mut magic = [0u8; 16];
    r.read_exact(&mut magic)?;
    if &magic != SIGNING_BLOCK_MAGIC {
        debug!("Invalid signing block magic");
        return Ok(None);
    }

    // The leading size field covers everything after itself
    let Some(start) = cd_off.checked_sub(block_size).and_then(|s| s.checked_sub(8)) else {
        return Ok(None);
    };
    if block_size < SIGNING_BLOCK_FOOTER {
        return Ok(None);
    }
    r.seek(SeekFrom::Start(start))?;
    if read_u64(r)? != block_size {
        debug!("Signing block size fields disagree");
        return Ok(None);
    }

    let mut pairs = vec![0u8; (block_size - SIGNING_BLOCK_FOOTER) as usize];
    r.read_exact(&mut pairs)?;

    let mut cursor = Cursor::new(&pairs);
    while !cursor.is_empty() {
        let Some(len) = cursor.u64() else {
            return Ok(None);
        };
        let Some(pair) = usize::try_from(len).ok().and_then(|n| cursor.take(n)) else {
            return Ok(None);
        };
        let mut pair = Cursor::new(pair);
        let Some(id) = pair.u32() else {
            return Ok(None);
        };
        if id == SIGNATURE_SCHEME_V2 {
            return Ok(first_certificate(pair).map(<[u8]>::to_vec));
        }
    }
    Ok(None)
}

/// First certificate of the first signer in a v2 scheme block
fn first_certificate(mut value: Cursor<'_>) -> Option<&[u8]> {
    let mut signers = value.prefixed()?;
    let mut signer = signers.prefixed()?;
    let mut signed_data = signer.prefixed()?;
    let _digests = signed_data.prefixed()?;
    let mut certificates = signed_data.prefixed()?;
    let cert = certificates.prefixed()?;
    Some(cert.rest())
}

struct Eocd {
    central_dir_off: u32,
    comment: Vec<u8>,
}

/// Scan back from the end for a record whose comment length matches its
/// distance to the end of the file
fn find_eocd<R: Read + Seek>(r: &mut R) -> io::Result<Option<Eocd>> {
    let len = r.seek(SeekFrom::End(0))?;
    if len < EOCD_SIZE {
        return Ok(None);
    }

    let tail_len = (EOCD_SIZE + MAX_COMMENT_SIZE).min(len);
    r.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = vec![0u8; tail_len as usize];
    r.read_exact(&mut tail)?;

    for comment_len in 0..=(tail_len - EOCD_SIZE) {
        let at = (tail_len - EOCD_SIZE - comment_len) as usize;
        let record = &tail[at..];
        if u64::from(le_u16(&record[20..])) != comment_len || le_u32(record) != EOCD_MAGIC {
            continue;
        }
        return Ok(Some(Eocd {
            central_dir_off: le_u32(&record[16..]),
            comment: record[EOCD_SIZE as usize..].to_vec(),
        }));
    }
    Ok(None)
}

/// Bounds-checked little-endian reader over a byte slice
struct Cursor<'b> {
    buf: &'b [u8],
}

impl<'b> Cursor<'b> {
    fn new(buf: &'b [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Option<&'b [u8]> {
        if n > self.buf.len() {
            return None;
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Some(head)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(le_u32)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Sub-cursor over a `u32` length-prefixed value
    fn prefixed(&mut self) -> Option<Cursor<'b>> {
        let len = self.u32()? as usize;
        self.take(len).map(Cursor::new)
    }

    fn rest(self) -> &'b [u8] {
        self.buf
    }
}

/// Decimal number in an archive comment. Parsing stops at the first NUL
/// and an empty comment reads as 0; any other non-digit is not a number.
fn parse_version(comment: &[u8]) -> Option<u32> {
    let mut value: u32 = 0;
    for &b in comment.iter().take_while(|&&b| b != 0) {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(value)
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
