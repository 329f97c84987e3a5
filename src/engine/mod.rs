//! The SMB1 correlation engine.
//!
//! ## Pipeline (per PDU)
//!
//! ```text
//! bytes
//!   → decode_header
//!   → walk_chain (registry dispatch per AndX block)
//!   → Conversation: request / response / continuation correlation
//!   → Reassembler (transaction family)
//!   → HandOff values for payload interpreters
//! ```
//!
//! The caller states which pass a call belongs to. The first pass mutates
//! conversation state; a replay pass only reads what the first pass
//! recorded, so a replay over the same frames returns the same outcomes no
//! matter how often or in which order it runs.

pub mod conversation;
pub mod correlation;
pub mod handoff;
pub mod reassembly;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::dissect::andx::walk_chain;
use crate::dissect::records::{BlockDetail, DecodedBlock, TransFragment};
use crate::dissect::registry::CommandRegistry;
use crate::error::{DissectError, Result};
use crate::protocol::commands::*;
use crate::protocol::cursor::ByteCursor;
use crate::protocol::header::{decode_header, Header};

use conversation::{
    Conversation, ConversationKey, ConversationStats, ConversationStore, Emission, FrameRecord,
    PendingRequest, PidMid, RequestContext, ServiceKind, TransactionContext,
};
use correlation::{CorrelatedExchange, Diagnostic, ResponseMatch};
use handoff::{classify_blob, classify_target, is_raw_ntlmssp, HandOff};
use reassembly::{Chunk, Fragment, FragmentOutcome, ReassemblyKey, Side, TransactionPayload};

/// Capture sequence number of a frame.
pub type FrameId = u64;

/// Direction of a PDU relative to the conversation's server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    ToServer,
    ToClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pass {
    /// Visiting pass: state is created and advanced.
    First,
    /// Any later pass: lookups only.
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub timestamp_us: u64,
    /// Transport-level direction when known.
    pub direction: Option<Direction>,
}

impl FrameInfo {
    pub fn new(frame_id: FrameId, timestamp_us: u64) -> Self {
        Self { frame_id, timestamp_us, direction: None }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// Everything the engine learned about one PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PduOutcome {
    pub frame_id: FrameId,
    pub pass: Pass,
    pub header: Header,
    pub is_request: bool,
    pub blocks: Vec<DecodedBlock>,
    /// Why the AndX walk stopped early, if it did. `blocks` holds what was
    /// decoded before that.
    pub chain_error: Option<DissectError>,
    pub exchange: Option<CorrelatedExchange>,
    /// Service kind of the PDU's TID when it was first seen.
    pub service: Option<ServiceKind>,
    pub handoffs: Vec<HandOff>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PduOutcome {
    pub fn is_fully_decoded(&self) -> bool {
        self.chain_error.is_none()
    }
}

/// Drives PDUs through decoding and correlation for one capture session.
pub struct Dissector {
    config: EngineConfig,
    registry: CommandRegistry,
    store: ConversationStore,
}

impl Dissector {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, CommandRegistry::with_builtin())
    }

    pub fn with_registry(config: EngineConfig, registry: CommandRegistry) -> Self {
        let store = ConversationStore::new(config.max_pending_requests, config.max_reassembly_bytes);
        Self { config, registry, store }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// External decoders register here.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.store.get(key)
    }

    /// Statistics summed over every conversation.
    pub fn stats(&self) -> ConversationStats {
        let mut total = ConversationStats::default();
        for conv in self.store.iter() {
            total += conv.stats();
        }
        total
    }

    fn is_request(&self, header: &Header, direction: Option<Direction>) -> bool {
        match direction {
            Some(d) if !self.config.trust_reply_flag => d == Direction::ToServer,
            _ => header.is_request(),
        }
    }

    /// Process one PDU.
    ///
    /// Fails only when the bytes are not an SMB1 PDU or the header itself
    /// is short. Problems past the header are reported in the outcome.
    pub fn process(&mut self, key: ConversationKey, frame: FrameInfo, bytes: &[u8], pass: Pass) -> Result<PduOutcome> {
        let header = match decode_header(bytes) {
            Ok(h) => h,
            Err(e) => {
                trace!(frame = frame.frame_id, error = %e, "header rejected");
                return Err(e);
            }
        };
        let is_request = self.is_request(&header, frame.direction);
        let cursor = ByteCursor::new(bytes);
        let chain = walk_chain(&self.registry, &cursor, &header, is_request, self.config.max_andx_chain);
        if let Some(e) = &chain.error {
            debug!(frame = frame.frame_id, command = command_name(header.command), error = %e, "PDU not fully decoded");
        }

        let mut outcome = PduOutcome {
            frame_id: frame.frame_id,
            pass,
            header,
            is_request,
            blocks: chain.blocks,
            chain_error: chain.error,
            exchange: None,
            service: None,
            handoffs: Vec::new(),
            diagnostics: Vec::new(),
        };

        let visited = self
            .store
            .get(&key)
            .is_some_and(|c| c.frame_record(frame.frame_id).is_some());
        match pass {
            Pass::First if !visited => {
                let conv = self.store.get_or_create(key);
                first_pass(conv, &self.config, &frame, &cursor, &mut outcome);
            }
            _ => {
                if let Some(conv) = self.store.get(&key) {
                    replay(conv, &frame, &cursor, &mut outcome);
                }
            }
        }
        Ok(outcome)
    }
}

fn request_context(blocks: &[DecodedBlock]) -> RequestContext {
    let mut ctx = RequestContext::default();
    for b in blocks {
        match &b.detail {
            BlockDetail::Fid { fid } => ctx.fid = Some(*fid),
            BlockDetail::TreeConnect { path } => ctx.tree_path = Some(path.clone()),
            BlockDetail::Transaction(t) => {
                ctx.fid = ctx.fid.or(t.fid);
                ctx.transaction = Some(TransactionContext {
                    kind: t.kind,
                    subcommand: t.subcommand,
                    name: t.name.clone(),
                });
            }
            _ => {}
        }
    }
    ctx
}

fn transaction_block(blocks: &[DecodedBlock]) -> Option<&TransFragment> {
    blocks.iter().find_map(|b| match &b.detail {
        BlockDetail::Transaction(t) => Some(t),
        _ => None,
    })
}

fn has_interim(blocks: &[DecodedBlock]) -> bool {
    blocks.iter().any(|b| matches!(b.detail, BlockDetail::InterimResponse { .. }))
}

/// Slice one PDU's transaction fragment out of the cursor. Chunks that run
/// past the captured bytes are cut short.
fn build_fragment<'a>(cursor: &ByteCursor<'a>, t: &TransFragment, is_request: bool) -> Fragment<'a> {
    let chunk = |c: &crate::dissect::records::ChunkRef| Chunk {
        displacement: c.displacement,
        declared: c.count,
        bytes: cursor.read_bytes_clamped(c.offset, c.count as usize).0,
    };
    Fragment {
        kind: t.kind,
        total_param: t.total_param,
        total_data: t.total_data,
        param: chunk(&t.param),
        data: chunk(&t.data),
        setup: cursor.read_bytes_clamped(t.setup.start, t.setup.len()).0,
        primary: if is_request { !t.secondary } else { t.is_first() },
    }
}

fn transaction_handoff(
    req: &PendingRequest,
    side: Side,
    service: Option<ServiceKind>,
    payload: TransactionPayload,
) -> HandOff {
    let (subcommand, name) = match &req.context.transaction {
        Some(t) => (t.subcommand, t.name.clone()),
        None => (None, None),
    };
    HandOff::Transaction {
        request_frame_id: req.request_frame_id,
        side,
        kind: payload.kind,
        subcommand,
        target: classify_target(payload.kind, subcommand, name.as_deref(), service),
        name,
        service,
        payload,
    }
}

fn blob_handoffs(blocks: &[DecodedBlock], cursor: &ByteCursor<'_>, raw_ntlmssp: bool) -> Vec<HandOff> {
    blocks
        .iter()
        .filter_map(|b| match &b.detail {
            BlockDetail::SecurityBlob { range } if !range.is_empty() => {
                let bytes = cursor.read_bytes_clamped(range.start, range.len()).0;
                Some(HandOff::SecurityBlob {
                    kind: classify_blob(bytes, raw_ntlmssp),
                    bytes: bytes.to_vec(),
                })
            }
            _ => None,
        })
        .collect()
}

fn first_pass(
    conv: &mut Conversation,
    config: &EngineConfig,
    frame: &FrameInfo,
    cursor: &ByteCursor<'_>,
    out: &mut PduOutcome,
) {
    let f = frame.frame_id;
    let t = frame.timestamp_us;
    let header = &out.header;
    let k = PidMid::new(header.pid(), header.mid);
    let command = header.command;
    let service = conv.service_for(header.tid);
    let mut record = FrameRecord { service, ..Default::default() };
    let mut diagnostics = Vec::new();

    let linked = if out.is_request {
        if is_continuation(command) {
            let (id, d) = conv.on_continuation(f, k, command, t);
            diagnostics.extend(d);
            id
        } else {
            let (id, d) = conv.on_request(f, k, command, t, request_context(&out.blocks));
            diagnostics.extend(d);
            Some(id)
        }
    } else {
        let (m, d) = conv.begin_response(f, k, command, t);
        diagnostics.extend(d);
        match m {
            ResponseMatch::Linked(id) => Some(id),
            ResponseMatch::Unlinked => None,
        }
    };
    let linked_req = linked.and_then(|id| conv.request(id)).cloned();

    // Transaction payloads.
    let mut incomplete = false;
    if let Some(req) = &linked_req {
        let side = if out.is_request { Side::Request } else { Side::Response };
        let rkey = ReassemblyKey::new(req.request_frame_id, side);
        if let Some(tf) = transaction_block(&out.blocks) {
            let fragment = build_fragment(cursor, tf, out.is_request);
            let single = !config.reassemble_transactions
                || (fragment.is_self_contained()
                    && !conv.reassembler.is_in_progress(&rkey)
                    && !conv.reassembler.is_complete(&rkey));
            let payload = if single {
                record.emission = Some(Emission::Single(rkey));
                Some(conv.reassembler.assemble_single(&fragment))
            } else {
                match conv.reassembler.on_fragment(rkey, f, &fragment) {
                    FragmentOutcome::Complete(p) => {
                        record.emission = Some(Emission::Reassembled(rkey));
                        Some(p)
                    }
                    FragmentOutcome::Incomplete => {
                        incomplete = true;
                        None
                    }
                    FragmentOutcome::AlreadyComplete => None,
                }
            };
            if let Some(p) = payload {
                out.handoffs.push(transaction_handoff(req, side, service, p));
            }
        } else if !out.is_request && has_interim(&out.blocks) {
            incomplete = !config.reassemble_transactions
                || conv
                    .reassembler
                    .is_in_progress(&ReassemblyKey::new(req.request_frame_id, Side::Request));
        }
    }
    if let (false, Some(id)) = (out.is_request, linked) {
        conv.finish_response(f, k, id, incomplete);
    }

    // Tree connect / disconnect learning.
    if !out.is_request && header.status.is_success() {
        for b in &out.blocks {
            match (b.command, &b.detail) {
                (SMB1_COMMAND_TREE_CONNECT_ANDX, detail) => {
                    let by_service = matches!(detail, BlockDetail::TreeConnected { service } if service == "IPC");
                    let by_path = linked_req
                        .as_ref()
                        .and_then(|r| r.context.tree_path.as_deref())
                        .is_some_and(|p| p.to_ascii_uppercase().ends_with("IPC$"));
                    let kind = if by_service || by_path { ServiceKind::Ipc } else { ServiceKind::Normal };
                    conv.learn_service(header.tid, kind);
                }
                (SMB1_COMMAND_TREE_DISCONNECT, _) => conv.forget_service(header.tid),
                _ => {}
            }
        }
    }

    // Session setup blobs.
    for b in &out.blocks {
        if let BlockDetail::SecurityBlob { range } = &b.detail {
            if is_raw_ntlmssp(cursor.read_bytes_clamped(range.start, range.len()).0) {
                conv.set_raw_ntlmssp();
            }
        }
    }
    record.raw_ntlmssp = conv.raw_ntlmssp();
    out.handoffs.extend(blob_handoffs(&out.blocks, cursor, record.raw_ntlmssp));

    record.diagnostics = diagnostics.clone();
    conv.record_frame(f, record);
    out.exchange = conv.exchange(f, k);
    out.service = service;
    out.diagnostics = diagnostics;
}

fn replay(conv: &Conversation, frame: &FrameInfo, cursor: &ByteCursor<'_>, out: &mut PduOutcome) {
    let f = frame.frame_id;
    let k = PidMid::new(out.header.pid(), out.header.mid);
    out.exchange = conv.exchange(f, k);
    let Some(record) = conv.frame_record(f) else {
        return;
    };
    out.service = record.service;
    out.diagnostics = record.diagnostics.clone();

    if let (Some(emission), Some(req)) = (record.emission, conv.linked_request(f, k)) {
        let (rkey, payload) = match emission {
            Emission::Single(rkey) => {
                let payload = transaction_block(&out.blocks)
                    .map(|tf| conv.reassembler().assemble_single(&build_fragment(cursor, tf, out.is_request)));
                (rkey, payload)
            }
            Emission::Reassembled(rkey) => (rkey, conv.reassembler().completed_at(&rkey, f).cloned()),
        };
        if let Some(p) = payload {
            out.handoffs.push(transaction_handoff(req, rkey.side, record.service, p));
        }
    }
    out.handoffs.extend(blob_handoffs(&out.blocks, cursor, record.raw_ntlmssp));
}
