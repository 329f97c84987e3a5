//! Opcode → decoder dispatch.
//!
//! A fixed 256-entry table of (request, response) decoders. Opcodes nobody
//! registered fall back to [`decode_generic`], which only validates the
//! word/byte count framing (and follows the AndX link for chainable
//! commands). External decoders can replace or add entries with
//! [`CommandRegistry::register`].

use crate::error::Result;
use crate::protocol::commands::*;
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::Header;

use super::records::*;

/// A command block decoder. Receives the PDU cursor, its header, the offset
/// of the block's WordCount byte and the command the block belongs to.
pub type DecodeFn = fn(&ByteCursor<'_>, &Header, usize, u8) -> Result<DecodedBlock>;

#[derive(Clone, Copy)]
struct Entry {
    request: DecodeFn,
    response: DecodeFn,
}

#[derive(Clone)]
pub struct CommandRegistry {
    table: [Option<Entry>; 256],
}

impl CommandRegistry {
    /// A registry with nothing registered: every opcode uses the generic
    /// framing decoder.
    pub fn empty() -> Self {
        Self { table: [None; 256] }
    }

    /// The decoders the correlation engine relies on.
    pub fn with_builtin() -> Self {
        let mut r = Self::empty();

        for cmd in [
            SMB1_COMMAND_CLOSE,
            SMB1_COMMAND_FLUSH,
            SMB1_COMMAND_READ,
            SMB1_COMMAND_WRITE,
            SMB1_COMMAND_LOCK_BYTE_RANGE,
            SMB1_COMMAND_UNLOCK_BYTE_RANGE,
            SMB1_COMMAND_WRITE_AND_CLOSE,
            SMB1_COMMAND_SEEK,
        ] {
            r.register(cmd, decode_leading_fid, decode_generic);
        }
        for cmd in [SMB1_COMMAND_READ_ANDX, SMB1_COMMAND_WRITE_ANDX, SMB1_COMMAND_LOCKING_ANDX] {
            r.register(cmd, decode_andx_fid, decode_generic);
        }
        r.register(SMB1_COMMAND_OPEN_ANDX, decode_generic, decode_andx_fid);
        r.register(SMB1_COMMAND_NT_CREATE_ANDX, decode_generic, decode_nt_create_response);
        r.register(
            SMB1_COMMAND_TREE_CONNECT_ANDX,
            decode_tree_connect_request,
            decode_tree_connect_response,
        );
        r.register(SMB1_COMMAND_SESSION_SETUP_ANDX, decode_session_setup, decode_session_setup);

        r.register(SMB1_COMMAND_TRANS, decode_trans_request, decode_trans_response);
        r.register(SMB1_COMMAND_TRANS2, decode_trans_request, decode_trans_response);
        r.register(SMB1_COMMAND_TRANS_SECONDARY, decode_trans_secondary_request, decode_trans_response);
        r.register(SMB1_COMMAND_TRANS2_SECONDARY, decode_trans_secondary_request, decode_trans_response);
        r.register(SMB1_COMMAND_NT_TRANS, decode_nt_trans_request, decode_nt_trans_response);
        r.register(
            SMB1_COMMAND_NT_TRANS_SECONDARY,
            decode_nt_trans_secondary_request,
            decode_nt_trans_response,
        );
        r
    }

    pub fn register(&mut self, opcode: u8, request: DecodeFn, response: DecodeFn) {
        self.table[opcode as usize] = Some(Entry { request, response });
    }

    pub fn unregister(&mut self, opcode: u8) {
        self.table[opcode as usize] = None;
    }

    pub fn is_registered(&self, opcode: u8) -> bool {
        self.table[opcode as usize].is_some()
    }

    pub fn dispatch(&self, opcode: u8, is_request: bool) -> DecodeFn {
        match self.table[opcode as usize] {
            Some(e) if is_request => e.request,
            Some(e) => e.response,
            None => decode_generic,
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
