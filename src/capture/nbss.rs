//! Session-service framing of a TCP byte stream into SMB PDUs.
//!
//! Over port 139 every PDU sits inside a NetBIOS session message
//! [RFC 1002 4.3.1]: type, flags (bit 0 extends the length to 17 bits) and
//! a 16-bit big-endian length. Port 445 uses the same four bytes as a zero
//! byte and a 24-bit length. Keep-alives and session setup packets are
//! skipped.

use tracing::debug;

use crate::engine::conversation::Transport;

pub const NBSS_SESSION_MESSAGE: u8 = 0x00;
pub const NBSS_SESSION_REQUEST: u8 = 0x81;
pub const NBSS_POSITIVE_RESPONSE: u8 = 0x82;
pub const NBSS_NEGATIVE_RESPONSE: u8 = 0x83;
pub const NBSS_RETARGET_RESPONSE: u8 = 0x84;
pub const NBSS_KEEP_ALIVE: u8 = 0x85;

const NBSS_HEADER_LEN: usize = 4;

/// Splits one direction of a connection into PDUs.
#[derive(Debug)]
pub struct NbssFramer {
    transport: Transport,
    buf: Vec<u8>,
    /// Set after an unknown packet type; the rest of the stream is ignored.
    lost_sync: bool,
}

impl NbssFramer {
    pub fn new(transport: Transport) -> Self {
        Self { transport, buf: Vec::new(), lost_sync: false }
    }

    /// Append stream bytes and return every PDU they completed.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        if self.lost_sync {
            return out;
        }
        self.buf.extend_from_slice(data);

        let mut pos = 0;
        while self.buf.len() - pos >= NBSS_HEADER_LEN {
            let h = &self.buf[pos..pos + NBSS_HEADER_LEN];
            let kind = h[0];
            let len = match self.transport {
                Transport::DirectTcp => u32::from_be_bytes([0, h[1], h[2], h[3]]) as usize,
                _ => (((h[1] & 0x01) as usize) << 16) | u16::from_be_bytes([h[2], h[3]]) as usize,
            };
            let known = matches!(
                kind,
                NBSS_SESSION_MESSAGE
                    | NBSS_SESSION_REQUEST
                    | NBSS_POSITIVE_RESPONSE
                    | NBSS_NEGATIVE_RESPONSE
                    | NBSS_RETARGET_RESPONSE
                    | NBSS_KEEP_ALIVE
            );
            if !known || (self.transport == Transport::DirectTcp && kind != NBSS_SESSION_MESSAGE) {
                debug!(kind, "unrecognised session packet; dropping rest of stream");
                self.lost_sync = true;
                self.buf.clear();
                return out;
            }
            let end = pos + NBSS_HEADER_LEN + len;
            if self.buf.len() < end {
                break;
            }
            if kind == NBSS_SESSION_MESSAGE {
                out.push(self.buf[pos + NBSS_HEADER_LEN..end].to_vec());
            }
            pos = end;
        }
        self.buf.drain(..pos);
        out
    }

    /// Bytes held back waiting for the rest of a PDU.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
