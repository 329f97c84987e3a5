//! AndX chain walking.
//!
//! One PDU may carry several command blocks linked through the
//! `AndXCommand`/`AndXOffset` pair at the start of each chainable block.
//! The walker follows the links inside the same PDU until `0xFF`, an
//! error, or the chain bound is reached.
//!
//! Forward progress alone does not stop a crafted PDU whose offset points
//! back at its own block, so the walk is also limited to the number of
//! minimum-sized blocks the PDU could physically hold.

use serde::Serialize;
use tracing::trace;

use crate::error::{DissectError, MalformedReason};
use crate::protocol::commands::SMB1_COMMAND_NONE;
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::{Header, SMB1_HEADER_SIZE};

use super::records::DecodedBlock;
use super::registry::CommandRegistry;

/// Smallest possible command block: WordCount (1) + ByteCount (2).
pub const MIN_COMMAND_BLOCK: usize = 3;

/// All blocks decoded from one PDU, and the error that stopped the walk
/// early, if any.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Chain {
    pub blocks: Vec<DecodedBlock>,
    pub error: Option<DissectError>,
}

impl Chain {
    pub fn first(&self) -> Option<&DecodedBlock> {
        self.blocks.first()
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Upper bound on the chain length for a PDU of `pdu_len` bytes.
pub fn max_chain_len(pdu_len: usize, cap: Option<usize>) -> usize {
    let physical = (pdu_len.saturating_sub(SMB1_HEADER_SIZE) / MIN_COMMAND_BLOCK).max(1);
    match cap {
        Some(cap) => physical.min(cap.max(1)),
        None => physical,
    }
}

/// Decode the first command at the end of the header and every block
/// chained behind it.
pub fn walk_chain(
    registry: &CommandRegistry,
    cursor: &ByteCursor<'_>,
    header: &Header,
    is_request: bool,
    cap: Option<usize>,
) -> Chain {
    let limit = max_chain_len(cursor.len(), cap);
    let mut chain = Chain::default();
    let mut command = header.command;
    let mut offset = SMB1_HEADER_SIZE;

    loop {
        let decode = registry.dispatch(command, is_request);
        let block = match decode(cursor, header, offset, command) {
            Ok(block) => block,
            Err(e) => {
                chain.error = Some(e);
                break;
            }
        };
        let next = block.andx;
        chain.blocks.push(block);

        let Some(andx) = next else { break };
        if andx.command == SMB1_COMMAND_NONE {
            break;
        }
        if andx.offset < offset {
            chain.error = Some(MalformedReason::BackwardAndX { offset: andx.offset, current: offset }.into());
            break;
        }
        if andx.offset >= cursor.len() {
            chain.error = Some(
                MalformedReason::AndXOffsetOutOfRange { offset: andx.offset, len: cursor.len() }.into(),
            );
            break;
        }
        if chain.blocks.len() >= limit {
            chain.error = Some(MalformedReason::AndXChainTooLong { limit }.into());
            break;
        }
        trace!(command = andx.command, offset = andx.offset, "following AndX link");
        command = andx.command;
        offset = andx.offset;
    }
    chain
}
