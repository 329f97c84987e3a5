//! Built-in command block decoders.
//!
//! Every SMB1 command block has the same outer framing [MS-CIFS 2.2.3.2]:
//!
//! ```text
//!   WordCount (1)  Words (2 * WordCount)  ByteCount (2)  Bytes (ByteCount)
//! ```
//!
//! The decoders here extract only what the correlation engine needs: the
//! AndX link, the FID a request refers to, tree connect path/service,
//! the session setup security blob, and the transaction family's
//! parameter/data/setup layout. Field-level rendering of the hundreds of
//! other structures belongs to external decoders.
//!
//! All offsets are relative to the start of the SMB header, which is how
//! the protocol itself expresses AndX, parameter and data offsets.

use std::ops::Range;

use serde::Serialize;

use crate::error::{MalformedReason, Result};
use crate::protocol::commands::*;
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::Header;

/// Link to the next command in an AndX chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AndX {
    pub command: u8,
    pub offset: usize,
}

/// One fragment's view of a parameter or data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRef {
    /// Offset of the bytes from the start of the header.
    pub offset: usize,
    pub count: u32,
    pub displacement: u32,
}

/// The layout of one transaction-family PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransFragment {
    pub kind: TransactionKind,
    pub secondary: bool,
    pub total_param: u32,
    pub total_data: u32,
    pub param: ChunkRef,
    pub data: ChunkRef,
    #[serde(skip)]
    pub setup: Range<usize>,
    /// Trans/Trans2 `Setup[0]`, or the NT Transact `Function`.
    pub subcommand: Option<u16>,
    /// Pipe or mailslot name of a Trans request.
    pub name: Option<String>,
    /// FID carried by a Trans2 secondary request.
    pub fid: Option<u16>,
}

impl TransFragment {
    /// True when both blocks start at displacement 0.
    pub fn is_first(&self) -> bool {
        self.param.displacement == 0 && self.data.displacement == 0
    }

    /// True when this single PDU declares the whole of both blocks.
    pub fn is_self_contained(&self) -> bool {
        self.is_first() && self.param.count >= self.total_param && self.data.count >= self.total_data
    }
}

/// What a decoder learned beyond the framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "detail")]
pub enum BlockDetail {
    None,
    Fid { fid: u16 },
    TreeConnect { path: String },
    TreeConnected { service: String },
    SecurityBlob {
        #[serde(skip)]
        range: Range<usize>,
    },
    Transaction(TransFragment),
    /// Zero-word transaction response acknowledging a partial request.
    InterimResponse { kind: TransactionKind },
}

/// One decoded command block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedBlock {
    pub command: u8,
    /// Offset of the WordCount byte.
    pub offset: usize,
    /// Offset just past the byte block.
    pub end: usize,
    pub word_count: u8,
    pub byte_count: u16,
    /// The byte block extends past the captured bytes.
    pub truncated: bool,
    pub andx: Option<AndX>,
    pub detail: BlockDetail,
}

/// Word/byte count framing of one block.
#[derive(Debug, Clone, Copy)]
pub struct Framing {
    pub offset: usize,
    pub word_count: u8,
    pub words: usize,
    pub byte_count: u16,
    pub bytes: usize,
    pub end: usize,
    pub truncated: bool,
}

impl Framing {
    fn block(&self, command: u8, andx: Option<AndX>, detail: BlockDetail) -> DecodedBlock {
        DecodedBlock {
            command,
            offset: self.offset,
            end: self.end,
            word_count: self.word_count,
            byte_count: self.byte_count,
            truncated: self.truncated,
            andx,
            detail,
        }
    }
}

/// Validate the WordCount/ByteCount framing at `offset`. The word block
/// must be present in full; a byte block that runs past the captured
/// bytes is clamped and flagged.
pub fn read_framing(cursor: &ByteCursor<'_>, offset: usize) -> Result<Framing> {
    let word_count = cursor.read_u8(offset)?;
    let words = offset + 1;
    let bcc_at = words + 2 * word_count as usize;
    let byte_count = cursor.read_u16le(bcc_at)?;
    let bytes = bcc_at + 2;
    let declared_end = bytes + byte_count as usize;
    let end = declared_end.min(cursor.len());
    Ok(Framing {
        offset,
        word_count,
        words,
        byte_count,
        bytes,
        end,
        truncated: end < declared_end,
    })
}

fn read_andx(cursor: &ByteCursor<'_>, f: &Framing) -> Result<Option<AndX>> {
    if f.word_count < 2 {
        // Error responses carry no parameter words at all.
        return Ok(None);
    }
    let command = cursor.read_u8(f.words)?;
    let offset = cursor.read_u16le(f.words + 2)? as usize;
    Ok(Some(AndX { command, offset }))
}

fn require_words(f: &Framing, min: u8) -> Result<()> {
    if f.word_count < min {
        return Err(MalformedReason::Framing(f.offset).into());
    }
    Ok(())
}

/// Framing only; follows the AndX link when the command is chainable.
pub fn decode_generic(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = if is_andx(command) { read_andx(cursor, &f)? } else { None };
    Ok(f.block(command, andx, BlockDetail::None))
}

/// AndX request/response whose only interesting field is a FID at word
/// offset 4 (after the AndX header).
pub fn decode_andx_fid(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = read_andx(cursor, &f)?;
    let detail = if f.word_count >= 3 {
        BlockDetail::Fid { fid: cursor.read_u16le(f.words + 4)? }
    } else {
        BlockDetail::None
    };
    Ok(f.block(command, andx, detail))
}

/// Non-chained request whose first parameter word is a FID (Close, Flush,
/// Read, Write, ...).
pub fn decode_leading_fid(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let detail = if f.word_count >= 1 {
        BlockDetail::Fid { fid: cursor.read_u16le(f.words)? }
    } else {
        BlockDetail::None
    };
    Ok(f.block(command, None, detail))
}

/// NT Create AndX response: the FID follows the one-byte oplock level.
pub fn decode_nt_create_response(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = read_andx(cursor, &f)?;
    let detail = if f.word_count >= 4 {
        BlockDetail::Fid { fid: cursor.read_u16le(f.words + 5)? }
    } else {
        BlockDetail::None
    };
    Ok(f.block(command, andx, detail))
}

/// Strings in the byte block of a Unicode PDU are aligned to an even
/// offset from the start of the header.
fn align_string(offset: usize, unicode: bool) -> usize {
    if unicode && offset % 2 == 1 {
        offset + 1
    } else {
        offset
    }
}

/// Tree Connect AndX request [MS-CIFS 2.2.4.55.1]:
/// `Flags(2) PasswordLength(2)`, then `Password Path Service`.
pub fn decode_tree_connect_request(cursor: &ByteCursor<'_>, hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = read_andx(cursor, &f)?;
    if f.word_count < 4 {
        return Ok(f.block(command, andx, BlockDetail::None));
    }
    let password_len = cursor.read_u16le(f.words + 6)? as usize;
    let path_at = align_string(f.bytes + password_len, hdr.is_unicode());
    let detail = if path_at < f.end {
        let (path, _) = cursor.read_string(path_at, hdr.is_unicode())?;
        BlockDetail::TreeConnect { path }
    } else {
        BlockDetail::None
    };
    Ok(f.block(command, andx, detail))
}

/// Tree Connect AndX response: the byte block starts with the ASCII
/// service type (`"IPC"`, `"A:"`, `"LPT1:"`, `"?????"`).
pub fn decode_tree_connect_response(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = read_andx(cursor, &f)?;
    let detail = if f.byte_count > 0 && f.bytes < f.end {
        let (service, _) = cursor.read_string(f.bytes, false)?;
        BlockDetail::TreeConnected { service }
    } else {
        BlockDetail::None
    };
    Ok(f.block(command, andx, detail))
}

/// Session Setup AndX with extended security: the request (12 words)
/// and response (4 words) carry a security blob length and the blob at
/// the start of the byte block.
pub fn decode_session_setup(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let andx = read_andx(cursor, &f)?;
    let blob_len_at = match f.word_count {
        12 => Some(f.words + 14),
        4 => Some(f.words + 6),
        _ => None,
    };
    let detail = match blob_len_at {
        Some(at) => {
            let len = cursor.read_u16le(at)? as usize;
            let end = (f.bytes + len).min(f.end);
            BlockDetail::SecurityBlob { range: f.bytes..end }
        }
        None => BlockDetail::None,
    };
    Ok(f.block(command, andx, detail))
}

fn setup_range(f: &Framing, setup_at: usize, setup_count: u8, cursor: &ByteCursor<'_>) -> Result<Range<usize>> {
    let len = 2 * setup_count as usize;
    cursor.read_bytes(setup_at, len)?;
    if setup_at + len > f.bytes - 2 {
        return Err(MalformedReason::Framing(f.offset).into());
    }
    Ok(setup_at..setup_at + len)
}

fn first_setup_word(cursor: &ByteCursor<'_>, setup: &Range<usize>) -> Result<Option<u16>> {
    if setup.len() >= 2 {
        Ok(Some(cursor.read_u16le(setup.start)?))
    } else {
        Ok(None)
    }
}

/// Transaction / Transaction2 primary request [MS-CIFS 2.2.4.33.1,
/// 2.2.4.46.1].
pub fn decode_trans_request(cursor: &ByteCursor<'_>, hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    require_words(&f, 14)?;
    let w = f.words;
    let total_param = cursor.read_u16le(w)? as u32;
    let total_data = cursor.read_u16le(w + 2)? as u32;
    let param_count = cursor.read_u16le(w + 18)? as u32;
    let param_offset = cursor.read_u16le(w + 20)? as usize;
    let data_count = cursor.read_u16le(w + 22)? as u32;
    let data_offset = cursor.read_u16le(w + 24)? as usize;
    let setup_count = cursor.read_u8(w + 26)?;
    let setup = setup_range(&f, w + 28, setup_count, cursor)?;

    let kind = if command == SMB1_COMMAND_TRANS2 {
        TransactionKind::Trans2
    } else {
        TransactionKind::Trans
    };
    let name = if kind == TransactionKind::Trans && f.byte_count > 0 {
        let at = align_string(f.bytes, hdr.is_unicode());
        if at < f.end {
            Some(cursor.read_string(at, hdr.is_unicode())?.0)
        } else {
            None
        }
    } else {
        None
    };

    let fragment = TransFragment {
        kind,
        secondary: false,
        total_param,
        total_data,
        param: ChunkRef { offset: param_offset, count: param_count, displacement: 0 },
        data: ChunkRef { offset: data_offset, count: data_count, displacement: 0 },
        subcommand: first_setup_word(cursor, &setup)?,
        setup,
        name,
        fid: None,
    };
    Ok(f.block(command, None, BlockDetail::Transaction(fragment)))
}

/// Transaction / Transaction2 secondary request [MS-CIFS 2.2.4.34.1,
/// 2.2.4.47.1]. Trans2 adds a trailing FID word.
pub fn decode_trans_secondary_request(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    require_words(&f, 8)?;
    let w = f.words;
    let kind = if command == SMB1_COMMAND_TRANS2_SECONDARY {
        TransactionKind::Trans2
    } else {
        TransactionKind::Trans
    };
    let fid = if kind == TransactionKind::Trans2 && f.word_count >= 9 {
        Some(cursor.read_u16le(w + 16)?)
    } else {
        None
    };
    let fragment = TransFragment {
        kind,
        secondary: true,
        total_param: cursor.read_u16le(w)? as u32,
        total_data: cursor.read_u16le(w + 2)? as u32,
        param: ChunkRef {
            count: cursor.read_u16le(w + 4)? as u32,
            offset: cursor.read_u16le(w + 6)? as usize,
            displacement: cursor.read_u16le(w + 8)? as u32,
        },
        data: ChunkRef {
            count: cursor.read_u16le(w + 10)? as u32,
            offset: cursor.read_u16le(w + 12)? as usize,
            displacement: cursor.read_u16le(w + 14)? as u32,
        },
        setup: 0..0,
        subcommand: None,
        name: None,
        fid,
    };
    Ok(f.block(command, None, BlockDetail::Transaction(fragment)))
}

/// Transaction / Transaction2 response [MS-CIFS 2.2.4.33.2, 2.2.4.46.2].
pub fn decode_trans_response(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    let kind = match transaction_kind(command) {
        Some((TransactionKind::Trans2, _)) => TransactionKind::Trans2,
        _ => TransactionKind::Trans,
    };
    if f.word_count == 0 {
        return Ok(f.block(command, None, BlockDetail::InterimResponse { kind }));
    }
    require_words(&f, 10)?;
    let w = f.words;
    let setup_count = cursor.read_u8(w + 18)?;
    let setup = setup_range(&f, w + 20, setup_count, cursor)?;
    let fragment = TransFragment {
        kind,
        secondary: false,
        total_param: cursor.read_u16le(w)? as u32,
        total_data: cursor.read_u16le(w + 2)? as u32,
        param: ChunkRef {
            count: cursor.read_u16le(w + 6)? as u32,
            offset: cursor.read_u16le(w + 8)? as usize,
            displacement: cursor.read_u16le(w + 10)? as u32,
        },
        data: ChunkRef {
            count: cursor.read_u16le(w + 12)? as u32,
            offset: cursor.read_u16le(w + 14)? as usize,
            displacement: cursor.read_u16le(w + 16)? as u32,
        },
        subcommand: None,
        setup,
        name: None,
        fid: None,
    };
    Ok(f.block(command, None, BlockDetail::Transaction(fragment)))
}

/// NT Transact primary request [MS-CIFS 2.2.4.62.1].
pub fn decode_nt_trans_request(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    require_words(&f, 19)?;
    let w = f.words;
    let setup_count = cursor.read_u8(w + 35)?;
    let function = cursor.read_u16le(w + 36)?;
    let setup = setup_range(&f, w + 38, setup_count, cursor)?;
    let fragment = TransFragment {
        kind: TransactionKind::NtTrans,
        secondary: false,
        total_param: cursor.read_u32le(w + 3)?,
        total_data: cursor.read_u32le(w + 7)?,
        param: ChunkRef {
            count: cursor.read_u32le(w + 19)?,
            offset: cursor.read_u32le(w + 23)? as usize,
            displacement: 0,
        },
        data: ChunkRef {
            count: cursor.read_u32le(w + 27)?,
            offset: cursor.read_u32le(w + 31)? as usize,
            displacement: 0,
        },
        setup,
        subcommand: Some(function),
        name: None,
        fid: None,
    };
    Ok(f.block(command, None, BlockDetail::Transaction(fragment)))
}

/// NT Transact response [MS-CIFS 2.2.4.62.2].
pub fn decode_nt_trans_response(cursor: &ByteCursor<'_>, _hdr: &Header, offset: usize, command: u8) -> Result<DecodedBlock> {
    nt_trans_fragment(cursor, offset, command, true)
}

/// NT Transact secondary request [MS-CIFS 2.2.4.63.1].
pub fn decode_nt_trans_secondary_request(
    cursor: &ByteCursor<'_>,
    _hdr: &Header,
    offset: usize,
    command: u8,
) -> Result<DecodedBlock> {
    nt_trans_fragment(cursor, offset, command, false)
}

// Responses and secondary requests share one layout; only the response
// carries setup words. The direction comes from dispatch, not the header.
fn nt_trans_fragment(cursor: &ByteCursor<'_>, offset: usize, command: u8, is_response: bool) -> Result<DecodedBlock> {
    let f = read_framing(cursor, offset)?;
    if is_response && f.word_count == 0 {
        return Ok(f.block(command, None, BlockDetail::InterimResponse { kind: TransactionKind::NtTrans }));
    }
    require_words(&f, 18)?;
    let w = f.words;
    let setup = if is_response && command == SMB1_COMMAND_NT_TRANS {
        let setup_count = cursor.read_u8(w + 35)?;
        setup_range(&f, w + 36, setup_count, cursor)?
    } else {
        0..0
    };
    let fragment = TransFragment {
        kind: TransactionKind::NtTrans,
        secondary: command == SMB1_COMMAND_NT_TRANS_SECONDARY && !is_response,
        total_param: cursor.read_u32le(w + 3)?,
        total_data: cursor.read_u32le(w + 7)?,
        param: ChunkRef {
            count: cursor.read_u32le(w + 11)?,
            offset: cursor.read_u32le(w + 15)? as usize,
            displacement: cursor.read_u32le(w + 19)?,
        },
        data: ChunkRef {
            count: cursor.read_u32le(w + 23)?,
            offset: cursor.read_u32le(w + 27)? as usize,
            displacement: cursor.read_u32le(w + 31)?,
        },
        setup,
        subcommand: None,
        name: None,
        fid: None,
    };
    Ok(f.block(command, None, BlockDetail::Transaction(fragment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::decode_header;

    /// 32-byte header followed by `body`.
    fn pdu(command: u8, reply: bool, flags2: u16, body: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"\xffSMB");
        v.push(command);
        v.extend_from_slice(&[0; 4]);
        v.push(if reply { 0x80 } else { 0x00 });
        v.extend_from_slice(&flags2.to_le_bytes());
        v.extend_from_slice(&[0; 20]);
        v.extend_from_slice(body);
        v
    }

    fn block(words: &[u16], bytes: &[u8]) -> Vec<u8> {
        let mut v = vec![words.len() as u8];
        for w in words {
            v.extend_from_slice(&w.to_le_bytes());
        }
        v.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        v.extend_from_slice(bytes);
        v
    }

    #[test]
    fn test_framing_truncated_byte_block() {
        let mut body = block(&[1, 2], &[0; 4]);
        // claim 100 bytes, only 4 present
        body[5] = 100;
        let bytes = pdu(0x04, false, 0, &body);
        let c = ByteCursor::new(&bytes);
        let f = read_framing(&c, 32).unwrap();
        assert!(f.truncated);
        assert_eq!(f.end, bytes.len());
    }

    #[test]
    fn test_framing_missing_words_is_error() {
        let bytes = pdu(0x04, false, 0, &[5, 0, 0]);
        let c = ByteCursor::new(&bytes);
        assert!(read_framing(&c, 32).is_err());
    }

    #[test]
    fn test_tree_connect_request_ascii() {
        // AndX(none), flags 0, password length 1
        let mut bytes_block = vec![0u8];
        bytes_block.extend_from_slice(b"\\\\SRV\\IPC$\0?????\0");
        let body = block(&[0x00ff, 0, 0, 1], &bytes_block);
        let bytes = pdu(SMB1_COMMAND_TREE_CONNECT_ANDX, false, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_tree_connect_request(&c, &hdr, 32, SMB1_COMMAND_TREE_CONNECT_ANDX).unwrap();
        assert_eq!(b.andx, Some(AndX { command: SMB1_COMMAND_NONE, offset: 0 }));
        assert_eq!(b.detail, BlockDetail::TreeConnect { path: "\\\\SRV\\IPC$".to_string() });
    }

    #[test]
    fn test_tree_connect_response_service() {
        let body = block(&[0x00ff, 0, 0], b"IPC\0\0");
        let bytes = pdu(SMB1_COMMAND_TREE_CONNECT_ANDX, true, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_tree_connect_response(&c, &hdr, 32, SMB1_COMMAND_TREE_CONNECT_ANDX).unwrap();
        assert_eq!(b.detail, BlockDetail::TreeConnected { service: "IPC".to_string() });
    }

    #[test]
    fn test_trans_request_with_pipe_name() {
        // 14 + 2 setup words; params 0, data 0
        let mut words = vec![0u16; 16];
        words[13] = 2; // SetupCount (low byte of word 13)
        words[14] = 0x0026; // TransactNmPipe
        words[15] = 0x4000; // FID
        let body = block(&words, b"\\PIPE\\\0");
        let bytes = pdu(SMB1_COMMAND_TRANS, false, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_trans_request(&c, &hdr, 32, SMB1_COMMAND_TRANS).unwrap();
        match b.detail {
            BlockDetail::Transaction(t) => {
                assert_eq!(t.kind, TransactionKind::Trans);
                assert_eq!(t.subcommand, Some(0x0026));
                assert_eq!(t.name.as_deref(), Some("\\PIPE\\"));
                assert!(t.is_self_contained());
            }
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_trans_request_too_few_words() {
        let body = block(&[0; 5], &[]);
        let bytes = pdu(SMB1_COMMAND_TRANS2, false, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let err = decode_trans_request(&c, &hdr, 32, SMB1_COMMAND_TRANS2).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_interim_trans_response() {
        let body = block(&[], &[]);
        let bytes = pdu(SMB1_COMMAND_TRANS2, true, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_trans_response(&c, &hdr, 32, SMB1_COMMAND_TRANS2).unwrap();
        assert_eq!(b.detail, BlockDetail::InterimResponse { kind: TransactionKind::Trans2 });
    }

    #[test]
    fn test_nt_trans_response_ignores_reply_flag() {
        // Reply bit clear, as seen from servers that do not set it.
        let body = block(&[], &[]);
        let bytes = pdu(SMB1_COMMAND_NT_TRANS, false, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_nt_trans_response(&c, &hdr, 32, SMB1_COMMAND_NT_TRANS).unwrap();
        assert_eq!(b.detail, BlockDetail::InterimResponse { kind: TransactionKind::NtTrans });

        // And a secondary request with the reply bit set is still a request.
        let bytes = pdu(SMB1_COMMAND_NT_TRANS_SECONDARY, true, 0, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        assert!(decode_nt_trans_secondary_request(&c, &hdr, 32, SMB1_COMMAND_NT_TRANS_SECONDARY).is_err());
    }

    #[test]
    fn test_session_setup_blob_range() {
        // 12 words, blob length at word 7
        let mut words = vec![0u16; 12];
        words[0] = 0x00ff;
        words[7] = 8;
        let body = block(&words, b"NTLMSSP\0tail");
        let bytes = pdu(SMB1_COMMAND_SESSION_SETUP_ANDX, false, 0x0800, &body);
        let hdr = decode_header(&bytes).unwrap();
        let c = ByteCursor::new(&bytes);
        let b = decode_session_setup(&c, &hdr, 32, SMB1_COMMAND_SESSION_SETUP_ANDX).unwrap();
        match b.detail {
            BlockDetail::SecurityBlob { range } => {
                assert_eq!(&bytes[range], b"NTLMSSP\0");
            }
            other => panic!("expected blob, got {:?}", other),
        }
    }
}
