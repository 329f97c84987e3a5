//! Payload hand-off decisions.
//!
//! The engine does not interpret transaction payloads or security blobs.
//! It decides which collaborator should, and hands over the bytes.

use serde::{Serialize, Serializer};

use super::conversation::ServiceKind;
use super::reassembly::{Side, TransactionPayload};
use super::FrameId;
use crate::protocol::commands::TransactionKind;

/// `TRANS_TRANSACT_NMPIPE`
pub const TRANS_TRANSACT_NMPIPE: u16 = 0x0026;

const NTLMSSP_SIGNATURE: &[u8] = b"NTLMSSP\0";

/// Who should interpret a transaction payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "target")]
pub enum PayloadTarget {
    DceRpc,
    Lanman,
    Mailslot,
    Trans2Subcommand { subcommand: Option<u16> },
    NtTransactFunction { function: Option<u16> },
    /// A Trans on something that is neither a pipe nor a mailslot.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlobKind {
    Gssapi,
    Ntlmssp,
}

fn serialize_len<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "handoff")]
pub enum HandOff {
    Transaction {
        request_frame_id: FrameId,
        side: Side,
        kind: TransactionKind,
        subcommand: Option<u16>,
        name: Option<String>,
        service: Option<ServiceKind>,
        target: PayloadTarget,
        payload: TransactionPayload,
    },
    SecurityBlob {
        kind: BlobKind,
        #[serde(rename = "len", serialize_with = "serialize_len")]
        bytes: Vec<u8>,
    },
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Pick the collaborator for a transaction payload.
pub fn classify_target(
    kind: TransactionKind,
    subcommand: Option<u16>,
    name: Option<&str>,
    service: Option<ServiceKind>,
) -> PayloadTarget {
    match kind {
        TransactionKind::Trans2 => return PayloadTarget::Trans2Subcommand { subcommand },
        TransactionKind::NtTrans => return PayloadTarget::NtTransactFunction { function: subcommand },
        TransactionKind::Trans => {}
    }
    let Some(name) = name else {
        return PayloadTarget::Opaque;
    };
    if starts_with_ignore_case(name, "\\MAILSLOT\\") {
        PayloadTarget::Mailslot
    } else if name.eq_ignore_ascii_case("\\PIPE\\LANMAN") {
        PayloadTarget::Lanman
    } else if starts_with_ignore_case(name, "\\PIPE\\")
        && (subcommand == Some(TRANS_TRANSACT_NMPIPE) || service == Some(ServiceKind::Ipc))
    {
        PayloadTarget::DceRpc
    } else {
        PayloadTarget::Opaque
    }
}

/// Raw NTLMSSP, or GSSAPI/SPNEGO wrapping. Once a session has used raw
/// NTLMSSP every later blob is treated that way.
pub fn classify_blob(blob: &[u8], raw_ntlmssp: bool) -> BlobKind {
    if raw_ntlmssp || blob.starts_with(NTLMSSP_SIGNATURE) {
        BlobKind::Ntlmssp
    } else {
        BlobKind::Gssapi
    }
}

pub fn is_raw_ntlmssp(blob: &[u8]) -> bool {
    blob.starts_with(NTLMSSP_SIGNATURE)
}
