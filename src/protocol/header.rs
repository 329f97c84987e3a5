//! SMB1 fixed 32-byte header [MS-CIFS 2.2.3.1].
//!
//! ```text
//!  0..4   Protocol      0xFF 'S' 'M' 'B'
//!  4      Command
//!  5..9   Status        DOS class/reserved/code or NTSTATUS
//!  9      Flags
//! 10..12  Flags2
//! 12..14  PIDHigh
//! 14..22  SecurityFeatures (signature / connectionless key + sequence)
//! 22..24  Reserved
//! 24..26  TID
//! 26..28  PIDLow
//! 28..30  UID
//! 30..32  MID
//! ```

use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;
use serde::Serialize;

use super::status::Status;
use crate::error::{DissectError, MalformedReason, Result};

pub const SMB1_HEADER_SIZE: usize = 32;

/// The SMB1 header magic bytes: 0xFF 'S' 'M' 'B'.
pub const SMB1_MAGIC: &[u8; 4] = b"\xffSMB";

pub const FLAGS_LOCK_AND_READ_OK: u8 = 0x01;
pub const FLAGS_CASE_INSENSITIVE: u8 = 0x08;
pub const FLAGS_CANONICALIZED_PATHS: u8 = 0x10;
pub const FLAGS_OPLOCK: u8 = 0x20;
/// SMB_FLAGS_REPLY: set by the server on every response.
pub const FLAGS_REPLY: u8 = 0x80;

pub const FLAGS2_LONG_NAMES: u16 = 0x0001;
pub const FLAGS2_EAS: u16 = 0x0002;
pub const FLAGS2_SECURITY_SIGNATURE: u16 = 0x0004;
pub const FLAGS2_IS_LONG_NAME: u16 = 0x0040;
pub const FLAGS2_DFS: u16 = 0x1000;
pub const FLAGS2_EXTENDED_SECURITY: u16 = 0x0800;
pub const FLAGS2_PAGING_IO: u16 = 0x2000;
pub const FLAGS2_NT_STATUS: u16 = 0x4000;
pub const FLAGS2_UNICODE: u16 = 0x8000;

/// A decoded SMB1 header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub command: u8,
    pub status: Status,
    pub flags: u8,
    pub flags2: u16,
    pub pid_high: u16,
    /// Security signature on connection-oriented transports, key and
    /// sequence number on connectionless ones. Kept opaque.
    #[serde(skip)]
    pub security: [u8; 8],
    pub tid: u16,
    pub pid_low: u16,
    pub uid: u16,
    pub mid: u16,
}

impl Header {
    /// Full 32-bit process id.
    pub fn pid(&self) -> u32 {
        ((self.pid_high as u32) << 16) | self.pid_low as u32
    }

    /// Requests are the frames without the reply bit. Some transports never
    /// set it; the engine can be told to ignore it.
    pub fn is_request(&self) -> bool {
        self.flags & FLAGS_REPLY == 0
    }

    pub fn is_unicode(&self) -> bool {
        self.flags2 & FLAGS2_UNICODE != 0
    }

    pub fn is_extended_security(&self) -> bool {
        self.flags2 & FLAGS2_EXTENDED_SECURITY != 0
    }

    pub fn is_nt_status(&self) -> bool {
        self.flags2 & FLAGS2_NT_STATUS != 0
    }
}

struct RawHeader {
    command: u8,
    status: [u8; 4],
    flags: u8,
    flags2: u16,
    pid_high: u16,
    security: [u8; 8],
    tid: u16,
    pid_low: u16,
    uid: u16,
    mid: u16,
}

fn parse_smb1_header(input: &[u8]) -> IResult<&[u8], RawHeader> {
    let (input, _magic) = tag(&SMB1_MAGIC[..])(input)?; // 0..4
    let (input, command) = le_u8(input)?; // 4
    let (input, status) = take(4usize)(input)?; // 5..9
    let (input, flags) = le_u8(input)?; // 9
    let (input, flags2) = le_u16(input)?; // 10..12
    let (input, pid_high) = le_u16(input)?; // 12..14
    let (input, security) = take(8usize)(input)?; // 14..22
    let (input, _reserved) = take(2usize)(input)?; // 22..24
    let (input, tid) = le_u16(input)?; // 24..26
    let (input, pid_low) = le_u16(input)?; // 26..28
    let (input, uid) = le_u16(input)?; // 28..30
    let (input, mid) = le_u16(input)?; // 30..32
    let mut status_raw = [0u8; 4];
    status_raw.copy_from_slice(status);
    let mut security_raw = [0u8; 8];
    security_raw.copy_from_slice(security);
    Ok((
        input,
        RawHeader {
            command,
            status: status_raw,
            flags,
            flags2,
            pid_high,
            security: security_raw,
            tid,
            pid_low,
            uid,
            mid,
        },
    ))
}

/// Decode the fixed header at the start of `bytes`.
///
/// A buffer that does not start with the SMB1 signature is a negative
/// match (`NotThisProtocol`); a correct signature followed by fewer than
/// 32 bytes is `Malformed`.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < SMB1_MAGIC.len() || &bytes[..SMB1_MAGIC.len()] != SMB1_MAGIC {
        return Err(DissectError::NotThisProtocol);
    }
    if bytes.len() < SMB1_HEADER_SIZE {
        return Err(MalformedReason::ShortHeader(bytes.len()).into());
    }
    let (_, raw) = parse_smb1_header(bytes)
        .map_err(|_| DissectError::from(MalformedReason::ShortHeader(bytes.len())))?;

    Ok(Header {
        command: raw.command,
        status: Status::from_raw(raw.status, raw.flags2 & FLAGS2_NT_STATUS != 0),
        flags: raw.flags,
        flags2: raw.flags2,
        pid_high: raw.pid_high,
        security: raw.security,
        tid: raw.tid,
        pid_low: raw.pid_low,
        uid: raw.uid,
        mid: raw.mid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::NtStatus;

    fn build_header(command: u8, flags: u8, flags2: u16, status: u32) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(SMB1_MAGIC);
        h.push(command);
        h.extend_from_slice(&status.to_le_bytes());
        h.push(flags);
        h.extend_from_slice(&flags2.to_le_bytes());
        h.extend_from_slice(&0x0001u16.to_le_bytes()); // pid high
        h.extend_from_slice(&[0xAA; 8]);
        h.extend_from_slice(&[0; 2]);
        h.extend_from_slice(&7u16.to_le_bytes()); // tid
        h.extend_from_slice(&0x1234u16.to_le_bytes()); // pid
        h.extend_from_slice(&100u16.to_le_bytes()); // uid
        h.extend_from_slice(&42u16.to_le_bytes()); // mid
        h
    }

    #[test]
    fn test_decode_request_header() {
        let bytes = build_header(0x72, 0x18, FLAGS2_UNICODE | FLAGS2_NT_STATUS, 0);
        let hdr = decode_header(&bytes).unwrap();
        assert_eq!(hdr.command, 0x72);
        assert!(hdr.is_request());
        assert!(hdr.is_unicode());
        assert_eq!(hdr.tid, 7);
        assert_eq!(hdr.pid(), 0x0001_1234);
        assert_eq!(hdr.uid, 100);
        assert_eq!(hdr.mid, 42);
        assert_eq!(hdr.security, [0xAA; 8]);
        assert_eq!(hdr.status, Status::Nt { code: NtStatus::SUCCESS });
    }

    #[test]
    fn test_decode_dos_status_reply() {
        // class ERRSRV, code 2 -> bytes 02 00 02 00
        let bytes = build_header(0x75, FLAGS_REPLY, 0, 0x0002_0002);
        let hdr = decode_header(&bytes).unwrap();
        assert!(!hdr.is_request());
        assert_eq!(hdr.status, Status::Dos { class: 2, code: 2 });
    }

    #[test]
    fn test_field_offsets() {
        let mut bytes = build_header(0, 0, 0, 0);
        bytes[4] = 0x25;
        bytes[9] = 0x08;
        bytes[10..12].copy_from_slice(&0x4001u16.to_le_bytes());
        bytes[12..14].copy_from_slice(&0x0102u16.to_le_bytes());
        bytes[24..26].copy_from_slice(&0x0a0bu16.to_le_bytes());
        bytes[26..28].copy_from_slice(&0x0304u16.to_le_bytes());
        bytes[28..30].copy_from_slice(&0x0c0du16.to_le_bytes());
        bytes[30..32].copy_from_slice(&0x0e0fu16.to_le_bytes());
        let hdr = decode_header(&bytes).unwrap();
        assert_eq!(hdr.command, 0x25);
        assert_eq!(hdr.flags, 0x08);
        assert_eq!(hdr.flags2, 0x4001);
        assert_eq!(hdr.pid(), 0x0102_0304);
        assert_eq!(hdr.tid, 0x0a0b);
        assert_eq!(hdr.uid, 0x0c0d);
        assert_eq!(hdr.mid, 0x0e0f);
    }

    #[test]
    fn test_wrong_signature() {
        let mut bytes = build_header(0x72, 0, 0, 0);
        bytes[0] = 0xFE;
        assert_eq!(decode_header(&bytes), Err(DissectError::NotThisProtocol));
        assert_eq!(decode_header(b"\xffS"), Err(DissectError::NotThisProtocol));
    }

    #[test]
    fn test_short_header_is_malformed() {
        let bytes = build_header(0x72, 0, 0, 0);
        let err = decode_header(&bytes[..20]).unwrap_err();
        assert_eq!(err, DissectError::Malformed(MalformedReason::ShortHeader(20)));
    }
}
