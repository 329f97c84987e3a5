//! SMB1 command codes and their classification.
//!
//! Reference: [MS-CIFS 2.2.2.1] SMB_COM command codes.

use serde::Serialize;

pub const SMB1_COMMAND_CREATE_DIRECTORY: u8 = 0x00;
pub const SMB1_COMMAND_DELETE_DIRECTORY: u8 = 0x01;
pub const SMB1_COMMAND_OPEN: u8 = 0x02;
pub const SMB1_COMMAND_CREATE: u8 = 0x03;
pub const SMB1_COMMAND_CLOSE: u8 = 0x04;
pub const SMB1_COMMAND_FLUSH: u8 = 0x05;
pub const SMB1_COMMAND_DELETE: u8 = 0x06;
pub const SMB1_COMMAND_RENAME: u8 = 0x07;
pub const SMB1_COMMAND_QUERY_INFORMATION: u8 = 0x08;
pub const SMB1_COMMAND_SET_INFORMATION: u8 = 0x09;
pub const SMB1_COMMAND_READ: u8 = 0x0a;
pub const SMB1_COMMAND_WRITE: u8 = 0x0b;
pub const SMB1_COMMAND_LOCK_BYTE_RANGE: u8 = 0x0c;
pub const SMB1_COMMAND_UNLOCK_BYTE_RANGE: u8 = 0x0d;
pub const SMB1_COMMAND_CREATE_TEMPORARY: u8 = 0x0e;
pub const SMB1_COMMAND_CREATE_NEW: u8 = 0x0f;
pub const SMB1_COMMAND_CHECK_DIRECTORY: u8 = 0x10;
pub const SMB1_COMMAND_PROCESS_EXIT: u8 = 0x11;
pub const SMB1_COMMAND_SEEK: u8 = 0x12;
pub const SMB1_COMMAND_LOCK_AND_READ: u8 = 0x13;
pub const SMB1_COMMAND_WRITE_AND_UNLOCK: u8 = 0x14;
pub const SMB1_COMMAND_READ_RAW: u8 = 0x1a;
pub const SMB1_COMMAND_WRITE_RAW: u8 = 0x1d;
pub const SMB1_COMMAND_LOCKING_ANDX: u8 = 0x24;
pub const SMB1_COMMAND_TRANS: u8 = 0x25;
pub const SMB1_COMMAND_TRANS_SECONDARY: u8 = 0x26;
pub const SMB1_COMMAND_IOCTL: u8 = 0x27;
pub const SMB1_COMMAND_ECHO: u8 = 0x2b;
pub const SMB1_COMMAND_WRITE_AND_CLOSE: u8 = 0x2c;
pub const SMB1_COMMAND_OPEN_ANDX: u8 = 0x2d;
pub const SMB1_COMMAND_READ_ANDX: u8 = 0x2e;
pub const SMB1_COMMAND_WRITE_ANDX: u8 = 0x2f;
pub const SMB1_COMMAND_TRANS2: u8 = 0x32;
pub const SMB1_COMMAND_TRANS2_SECONDARY: u8 = 0x33;
pub const SMB1_COMMAND_FIND_CLOSE2: u8 = 0x34;
pub const SMB1_COMMAND_TREE_DISCONNECT: u8 = 0x71;
pub const SMB1_COMMAND_NEGOTIATE_PROTOCOL: u8 = 0x72;
pub const SMB1_COMMAND_SESSION_SETUP_ANDX: u8 = 0x73;
pub const SMB1_COMMAND_LOGOFF_ANDX: u8 = 0x74;
pub const SMB1_COMMAND_TREE_CONNECT_ANDX: u8 = 0x75;
pub const SMB1_COMMAND_QUERY_INFO_DISK: u8 = 0x80;
pub const SMB1_COMMAND_SEARCH: u8 = 0x81;
pub const SMB1_COMMAND_NT_TRANS: u8 = 0xa0;
pub const SMB1_COMMAND_NT_TRANS_SECONDARY: u8 = 0xa1;
pub const SMB1_COMMAND_NT_CREATE_ANDX: u8 = 0xa2;
pub const SMB1_COMMAND_NT_CANCEL: u8 = 0xa4;
pub const SMB1_COMMAND_OPEN_PRINT_FILE: u8 = 0xc0;
pub const SMB1_COMMAND_WRITE_PRINT_FILE: u8 = 0xc1;
pub const SMB1_COMMAND_CLOSE_PRINT_FILE: u8 = 0xc2;
/// AndXCommand value that terminates a chain.
pub const SMB1_COMMAND_NONE: u8 = 0xff;

pub fn command_name(c: u8) -> &'static str {
    match c {
        SMB1_COMMAND_CREATE_DIRECTORY => "CREATE_DIRECTORY",
        SMB1_COMMAND_DELETE_DIRECTORY => "DELETE_DIRECTORY",
        SMB1_COMMAND_OPEN => "OPEN",
        SMB1_COMMAND_CREATE => "CREATE",
        SMB1_COMMAND_CLOSE => "CLOSE",
        SMB1_COMMAND_FLUSH => "FLUSH",
        SMB1_COMMAND_DELETE => "DELETE",
        SMB1_COMMAND_RENAME => "RENAME",
        SMB1_COMMAND_QUERY_INFORMATION => "QUERY_INFORMATION",
        SMB1_COMMAND_SET_INFORMATION => "SET_INFORMATION",
        SMB1_COMMAND_READ => "READ",
        SMB1_COMMAND_WRITE => "WRITE",
        SMB1_COMMAND_LOCK_BYTE_RANGE => "LOCK_BYTE_RANGE",
        SMB1_COMMAND_UNLOCK_BYTE_RANGE => "UNLOCK_BYTE_RANGE",
        SMB1_COMMAND_CREATE_TEMPORARY => "CREATE_TEMPORARY",
        SMB1_COMMAND_CREATE_NEW => "CREATE_NEW",
        SMB1_COMMAND_CHECK_DIRECTORY => "CHECK_DIRECTORY",
        SMB1_COMMAND_PROCESS_EXIT => "PROCESS_EXIT",
        SMB1_COMMAND_SEEK => "SEEK",
        SMB1_COMMAND_LOCK_AND_READ => "LOCK_AND_READ",
        SMB1_COMMAND_WRITE_AND_UNLOCK => "WRITE_AND_UNLOCK",
        SMB1_COMMAND_READ_RAW => "READ_RAW",
        SMB1_COMMAND_WRITE_RAW => "WRITE_RAW",
        SMB1_COMMAND_LOCKING_ANDX => "LOCKING_ANDX",
        SMB1_COMMAND_TRANS => "TRANSACTION",
        SMB1_COMMAND_TRANS_SECONDARY => "TRANSACTION_SECONDARY",
        SMB1_COMMAND_IOCTL => "IOCTL",
        SMB1_COMMAND_ECHO => "ECHO",
        SMB1_COMMAND_WRITE_AND_CLOSE => "WRITE_AND_CLOSE",
        SMB1_COMMAND_OPEN_ANDX => "OPEN_ANDX",
        SMB1_COMMAND_READ_ANDX => "READ_ANDX",
        SMB1_COMMAND_WRITE_ANDX => "WRITE_ANDX",
        SMB1_COMMAND_TRANS2 => "TRANSACTION2",
        SMB1_COMMAND_TRANS2_SECONDARY => "TRANSACTION2_SECONDARY",
        SMB1_COMMAND_FIND_CLOSE2 => "FIND_CLOSE2",
        SMB1_COMMAND_TREE_DISCONNECT => "TREE_DISCONNECT",
        SMB1_COMMAND_NEGOTIATE_PROTOCOL => "NEGOTIATE",
        SMB1_COMMAND_SESSION_SETUP_ANDX => "SESSION_SETUP_ANDX",
        SMB1_COMMAND_LOGOFF_ANDX => "LOGOFF_ANDX",
        SMB1_COMMAND_TREE_CONNECT_ANDX => "TREE_CONNECT_ANDX",
        SMB1_COMMAND_QUERY_INFO_DISK => "QUERY_INFORMATION_DISK",
        SMB1_COMMAND_SEARCH => "SEARCH",
        SMB1_COMMAND_NT_TRANS => "NT_TRANSACT",
        SMB1_COMMAND_NT_TRANS_SECONDARY => "NT_TRANSACT_SECONDARY",
        SMB1_COMMAND_NT_CREATE_ANDX => "NT_CREATE_ANDX",
        SMB1_COMMAND_NT_CANCEL => "NT_CANCEL",
        SMB1_COMMAND_OPEN_PRINT_FILE => "OPEN_PRINT_FILE",
        SMB1_COMMAND_WRITE_PRINT_FILE => "WRITE_PRINT_FILE",
        SMB1_COMMAND_CLOSE_PRINT_FILE => "CLOSE_PRINT_FILE",
        SMB1_COMMAND_NONE => "NO_ANDX_COMMAND",
        _ => "UNKNOWN",
    }
}

/// Commands whose parameter block starts with an AndX header.
pub fn is_andx(c: u8) -> bool {
    matches!(
        c,
        SMB1_COMMAND_LOCKING_ANDX
            | SMB1_COMMAND_OPEN_ANDX
            | SMB1_COMMAND_READ_ANDX
            | SMB1_COMMAND_WRITE_ANDX
            | SMB1_COMMAND_SESSION_SETUP_ANDX
            | SMB1_COMMAND_LOGOFF_ANDX
            | SMB1_COMMAND_TREE_CONNECT_ANDX
            | SMB1_COMMAND_NT_CREATE_ANDX
    )
}

/// Requests that refer to an earlier request instead of starting a new
/// exchange of their own.
pub fn is_continuation(c: u8) -> bool {
    matches!(
        c,
        SMB1_COMMAND_TRANS_SECONDARY
            | SMB1_COMMAND_TRANS2_SECONDARY
            | SMB1_COMMAND_NT_TRANS_SECONDARY
            | SMB1_COMMAND_NT_CANCEL
    )
}

/// The three transaction sub-protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionKind {
    Trans,
    Trans2,
    NtTrans,
}

impl TransactionKind {
    pub fn primary_command(self) -> u8 {
        match self {
            TransactionKind::Trans => SMB1_COMMAND_TRANS,
            TransactionKind::Trans2 => SMB1_COMMAND_TRANS2,
            TransactionKind::NtTrans => SMB1_COMMAND_NT_TRANS,
        }
    }
}

/// Transaction family membership: the kind and whether `c` is the
/// secondary (continuation) variant.
pub fn transaction_kind(c: u8) -> Option<(TransactionKind, bool)> {
    match c {
        SMB1_COMMAND_TRANS => Some((TransactionKind::Trans, false)),
        SMB1_COMMAND_TRANS_SECONDARY => Some((TransactionKind::Trans, true)),
        SMB1_COMMAND_TRANS2 => Some((TransactionKind::Trans2, false)),
        SMB1_COMMAND_TRANS2_SECONDARY => Some((TransactionKind::Trans2, true)),
        SMB1_COMMAND_NT_TRANS => Some((TransactionKind::NtTrans, false)),
        SMB1_COMMAND_NT_TRANS_SECONDARY => Some((TransactionKind::NtTrans, true)),
        _ => None,
    }
}

/// The command a request/response belongs to semantically: secondaries
/// share their primary's command.
pub fn semantic_command(c: u8) -> u8 {
    match transaction_kind(c) {
        Some((kind, _)) => kind.primary_command(),
        None => c,
    }
}

/// Whether a response carrying `response_cmd` may answer a request that was
/// sent as `request_cmd`.
pub fn response_matches(response_cmd: u8, request_cmd: u8) -> bool {
    response_cmd == request_cmd || semantic_command(response_cmd) == semantic_command(request_cmd)
}
