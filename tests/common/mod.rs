#![allow(dead_code)]
//! SMB1 PDU builders shared by the integration tests.
//!
//! Every builder returns a complete PDU starting at the `\xffSMB` header.
//! Offsets inside transaction blocks are computed from the header start,
//! the way the protocol expresses them.

use smbwire::engine::conversation::{ConversationKey, Transport};
use smbwire::engine::{Dissector, FrameId, FrameInfo, Pass, PduOutcome};
use smbwire::EngineConfig;

pub const SMB1_HEADER_SIZE: usize = 32;

pub const CMD_CLOSE: u8 = 0x04;
pub const CMD_TRANS: u8 = 0x25;
pub const CMD_TRANS_SECONDARY: u8 = 0x26;
pub const CMD_ECHO: u8 = 0x2b;
pub const CMD_TRANS2: u8 = 0x32;
pub const CMD_TRANS2_SECONDARY: u8 = 0x33;
pub const CMD_TREE_DISCONNECT: u8 = 0x71;
pub const CMD_SESSION_SETUP_ANDX: u8 = 0x73;
pub const CMD_LOGOFF_ANDX: u8 = 0x74;
pub const CMD_TREE_CONNECT_ANDX: u8 = 0x75;
pub const CMD_NT_TRANS: u8 = 0xa0;
pub const CMD_NT_TRANS_SECONDARY: u8 = 0xa1;
pub const CMD_NT_CANCEL: u8 = 0xa4;
pub const CMD_NONE: u8 = 0xff;

pub const FLAGS2_EXTENDED_SECURITY: u16 = 0x0800;
pub const FLAGS2_NT_STATUS: u16 = 0x4000;

pub const STATUS_CANCELLED: u32 = 0xC000_0120;
pub const STATUS_ACCESS_DENIED: u32 = 0xC000_0022;

/// PID, MID and TID of one exchange.
#[derive(Debug, Clone, Copy)]
pub struct Ids {
    pub pid: u32,
    pub mid: u16,
    pub tid: u16,
}

impl Ids {
    pub fn new(pid: u32, mid: u16) -> Self {
        Self { pid, mid, tid: 1 }
    }

    pub fn tid(mut self, tid: u16) -> Self {
        self.tid = tid;
        self
    }
}

pub fn header(command: u8, reply: bool, flags2: u16, ids: Ids) -> Vec<u8> {
    let mut h = Vec::with_capacity(SMB1_HEADER_SIZE);
    h.extend_from_slice(b"\xffSMB");
    h.push(command);
    h.extend_from_slice(&[0; 4]); // status
    h.push(if reply { 0x80 } else { 0x00 });
    h.extend_from_slice(&flags2.to_le_bytes());
    h.extend_from_slice(&((ids.pid >> 16) as u16).to_le_bytes());
    h.extend_from_slice(&[0; 8]); // security features
    h.extend_from_slice(&[0; 2]); // reserved
    h.extend_from_slice(&ids.tid.to_le_bytes());
    h.extend_from_slice(&(ids.pid as u16).to_le_bytes());
    h.extend_from_slice(&0x0800u16.to_le_bytes()); // uid
    h.extend_from_slice(&ids.mid.to_le_bytes());
    h
}

/// WordCount, words, ByteCount, bytes.
pub fn block(words: &[u16], bytes: &[u8]) -> Vec<u8> {
    let mut v = vec![words.len() as u8];
    for w in words {
        v.extend_from_slice(&w.to_le_bytes());
    }
    v.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    v.extend_from_slice(bytes);
    v
}

/// Like [`block`], for parameter words that are not 16-bit aligned.
pub fn raw_block(word_bytes: &[u8], bytes: &[u8]) -> Vec<u8> {
    assert_eq!(word_bytes.len() % 2, 0);
    let mut v = vec![(word_bytes.len() / 2) as u8];
    v.extend_from_slice(word_bytes);
    v.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    v.extend_from_slice(bytes);
    v
}

pub fn request(command: u8, ids: Ids, body: &[u8]) -> Vec<u8> {
    let mut v = header(command, false, 0, ids);
    v.extend_from_slice(body);
    v
}

pub fn response(command: u8, ids: Ids, body: &[u8]) -> Vec<u8> {
    let mut v = header(command, true, 0, ids);
    v.extend_from_slice(body);
    v
}

/// Set an NTSTATUS code on an already built PDU.
pub fn with_nt_status(mut pdu: Vec<u8>, status: u32) -> Vec<u8> {
    pdu[5..9].copy_from_slice(&status.to_le_bytes());
    let flags2 = u16::from_le_bytes([pdu[10], pdu[11]]) | FLAGS2_NT_STATUS;
    pdu[10..12].copy_from_slice(&flags2.to_le_bytes());
    pdu
}

/// Offset of the byte block for a block with `word_count` words placed
/// right after the header.
fn bytes_start(word_count: usize) -> usize {
    SMB1_HEADER_SIZE + 1 + 2 * word_count + 2
}

// ── Simple commands ──

pub fn echo_request(ids: Ids) -> Vec<u8> {
    request(CMD_ECHO, ids, &block(&[1], b"ping"))
}

pub fn echo_response(ids: Ids) -> Vec<u8> {
    response(CMD_ECHO, ids, &block(&[1], b"ping"))
}

pub fn close_request(ids: Ids, fid: u16) -> Vec<u8> {
    request(CMD_CLOSE, ids, &block(&[fid, 0, 0], &[]))
}

pub fn close_response(ids: Ids) -> Vec<u8> {
    response(CMD_CLOSE, ids, &block(&[], &[]))
}

pub fn nt_cancel(ids: Ids) -> Vec<u8> {
    request(CMD_NT_CANCEL, ids, &block(&[], &[]))
}

/// Zero-word response: an interim acknowledgement, or an error.
pub fn empty_response(command: u8, ids: Ids) -> Vec<u8> {
    response(command, ids, &block(&[], &[]))
}

pub fn tree_connect_request(ids: Ids, path: &str) -> Vec<u8> {
    let mut bytes = vec![0u8]; // one-byte password
    bytes.extend_from_slice(path.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(b"?????\0");
    request(CMD_TREE_CONNECT_ANDX, ids, &block(&[0x00ff, 0, 0, 1], &bytes))
}

pub fn tree_connect_response(ids: Ids, service: &str) -> Vec<u8> {
    let mut bytes = service.as_bytes().to_vec();
    bytes.extend_from_slice(b"\0\0");
    response(CMD_TREE_CONNECT_ANDX, ids, &block(&[0x00ff, 0, 0], &bytes))
}

pub fn tree_disconnect(ids: Ids, reply: bool) -> Vec<u8> {
    let mut v = header(CMD_TREE_DISCONNECT, reply, 0, ids);
    v.extend_from_slice(&block(&[], &[]));
    v
}

pub fn session_setup_request(ids: Ids, blob: &[u8]) -> Vec<u8> {
    let mut words = [0u16; 12];
    words[0] = 0x00ff;
    words[7] = blob.len() as u16;
    let mut v = header(CMD_SESSION_SETUP_ANDX, false, FLAGS2_EXTENDED_SECURITY, ids);
    v.extend_from_slice(&block(&words, blob));
    v
}

pub fn session_setup_response(ids: Ids, blob: &[u8]) -> Vec<u8> {
    let words = [0x00ff, 0, 0, blob.len() as u16];
    let mut v = header(CMD_SESSION_SETUP_ANDX, true, FLAGS2_EXTENDED_SECURITY, ids);
    v.extend_from_slice(&block(&words, blob));
    v
}

// ── Transaction family ──

/// Trans or Trans2 primary request. `name` is only carried by Trans.
pub fn trans_request(
    command: u8,
    ids: Ids,
    setup: &[u16],
    name: Option<&str>,
    total: (u16, u16),
    param: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let word_count = 14 + setup.len();
    let mut bytes = Vec::new();
    if let Some(name) = name {
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
    }
    let param_offset = bytes_start(word_count) + bytes.len();
    bytes.extend_from_slice(param);
    let data_offset = param_offset + param.len();
    bytes.extend_from_slice(data);

    let mut words = vec![
        total.0,
        total.1,
        1024, // max parameter count
        4096, // max data count
        0,    // max setup count, reserved
        0,    // flags
        0,
        0, // timeout
        0, // reserved
        param.len() as u16,
        param_offset as u16,
        data.len() as u16,
        data_offset as u16,
        setup.len() as u16, // setup count, reserved
    ];
    words.extend_from_slice(setup);
    request(command, ids, &block(&words, &bytes))
}

/// Trans or Trans2 secondary request.
pub fn trans_secondary(
    command: u8,
    ids: Ids,
    total: (u16, u16),
    param: &[u8],
    param_disp: u16,
    data: &[u8],
    data_disp: u16,
) -> Vec<u8> {
    let word_count = if command == CMD_TRANS2_SECONDARY { 9 } else { 8 };
    let param_offset = bytes_start(word_count);
    let data_offset = param_offset + param.len();
    let mut words = vec![
        total.0,
        total.1,
        param.len() as u16,
        param_offset as u16,
        param_disp,
        data.len() as u16,
        data_offset as u16,
        data_disp,
    ];
    if command == CMD_TRANS2_SECONDARY {
        words.push(0xffff); // fid
    }
    let mut bytes = param.to_vec();
    bytes.extend_from_slice(data);
    request(command, ids, &block(&words, &bytes))
}

/// Trans or Trans2 response fragment.
pub fn trans_response(
    command: u8,
    ids: Ids,
    total: (u16, u16),
    param: &[u8],
    param_disp: u16,
    data: &[u8],
    data_disp: u16,
) -> Vec<u8> {
    let param_offset = bytes_start(10);
    let data_offset = param_offset + param.len();
    let words = [
        total.0,
        total.1,
        0, // reserved
        param.len() as u16,
        param_offset as u16,
        param_disp,
        data.len() as u16,
        data_offset as u16,
        data_disp,
        0, // setup count, reserved
    ];
    let mut bytes = param.to_vec();
    bytes.extend_from_slice(data);
    response(command, ids, &block(&words, &bytes))
}

/// NT Transact primary request without setup words.
pub fn nt_trans_request(ids: Ids, function: u16, total: (u32, u32), param: &[u8], data: &[u8]) -> Vec<u8> {
    let param_offset = bytes_start(19) as u32;
    let data_offset = param_offset + param.len() as u32;
    let mut w = Vec::with_capacity(38);
    w.push(0); // max setup count
    w.extend_from_slice(&[0; 2]); // reserved
    w.extend_from_slice(&total.0.to_le_bytes());
    w.extend_from_slice(&total.1.to_le_bytes());
    w.extend_from_slice(&1024u32.to_le_bytes());
    w.extend_from_slice(&65536u32.to_le_bytes());
    w.extend_from_slice(&(param.len() as u32).to_le_bytes());
    w.extend_from_slice(&param_offset.to_le_bytes());
    w.extend_from_slice(&(data.len() as u32).to_le_bytes());
    w.extend_from_slice(&data_offset.to_le_bytes());
    w.push(0); // setup count
    w.extend_from_slice(&function.to_le_bytes());
    let mut bytes = param.to_vec();
    bytes.extend_from_slice(data);
    request(CMD_NT_TRANS, ids, &raw_block(&w, &bytes))
}

/// NT Transact secondary request or response fragment (both 18 words
/// with no setup).
pub fn nt_trans_fragment(
    command: u8,
    reply: bool,
    ids: Ids,
    total: (u32, u32),
    param: &[u8],
    param_disp: u32,
    data: &[u8],
    data_disp: u32,
) -> Vec<u8> {
    let param_offset = bytes_start(18) as u32;
    let data_offset = param_offset + param.len() as u32;
    let mut w = Vec::with_capacity(36);
    w.extend_from_slice(&[0; 3]); // reserved
    w.extend_from_slice(&total.0.to_le_bytes());
    w.extend_from_slice(&total.1.to_le_bytes());
    w.extend_from_slice(&(param.len() as u32).to_le_bytes());
    w.extend_from_slice(&param_offset.to_le_bytes());
    w.extend_from_slice(&param_disp.to_le_bytes());
    w.extend_from_slice(&(data.len() as u32).to_le_bytes());
    w.extend_from_slice(&data_offset.to_le_bytes());
    w.extend_from_slice(&data_disp.to_le_bytes());
    w.push(0); // setup count / reserved
    let mut bytes = param.to_vec();
    bytes.extend_from_slice(data);
    let mut v = header(command, reply, 0, ids);
    v.extend_from_slice(&raw_block(&w, &bytes));
    v
}

// ── Engine driving ──

pub fn key() -> ConversationKey {
    key_for(40000)
}

pub fn key_for(client_port: u16) -> ConversationKey {
    ConversationKey::new(
        format!("10.0.0.1:{}", client_port).parse().unwrap(),
        "10.0.0.2:445".parse().unwrap(),
        Transport::DirectTcp,
    )
}

pub fn dissector() -> Dissector {
    Dissector::new(EngineConfig::default())
}

/// Feed one PDU on the first pass, timestamped `frame` milliseconds in.
pub fn first(d: &mut Dissector, frame: FrameId, pdu: &[u8]) -> PduOutcome {
    d.process(key(), FrameInfo::new(frame, frame * 1000), pdu, Pass::First)
        .expect("SMB1 PDU")
}

pub fn replay(d: &mut Dissector, frame: FrameId, pdu: &[u8]) -> PduOutcome {
    d.process(key(), FrameInfo::new(frame, frame * 1000), pdu, Pass::Replay)
        .expect("SMB1 PDU")
}
