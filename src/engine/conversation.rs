//! Per-session correlation state.
//!
//! A [`Conversation`] owns everything learned from one client/server
//! session: the arena of requests seen, the outstanding-request table keyed
//! by PID/MID, the frame → exchange links, the TID → service cache, the
//! sticky raw NTLMSSP flag and the transaction reassembly buffers. Nothing
//! is shared between conversations.
//!
//! Requests live in an append-only arena and are referenced by
//! [`RequestId`]; the tables only hold ids.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use serde::Serialize;
use tracing::debug;

use super::correlation::{AbandonReason, Diagnostic, ExchangeLink};
use super::reassembly::{Reassembler, ReassemblyKey};
use super::{Direction, FrameId};
use crate::protocol::commands::TransactionKind;

/// Well-known SMB server ports.
pub const SMB_DIRECT_PORT: u16 = 445;
pub const NETBIOS_SESSION_PORT: u16 = 139;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    /// SMB directly over TCP (port 445).
    DirectTcp,
    /// NetBIOS session service over TCP (port 139).
    NetbiosSession,
    /// NetBIOS datagram service (mailslots over UDP 138).
    NetbiosDatagram,
}

/// Identity of one session, oriented client → server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConversationKey {
    pub client: SocketAddr,
    pub server: SocketAddr,
    pub transport: Transport,
}

impl ConversationKey {
    pub fn new(client: SocketAddr, server: SocketAddr, transport: Transport) -> Self {
        Self { client, server, transport }
    }

    /// Orient a packet's endpoints: the side on a well-known SMB port is the
    /// server, otherwise the lower port is. Returns the key and the packet's
    /// direction.
    pub fn from_endpoints(src: SocketAddr, dst: SocketAddr, transport: Transport) -> (Self, Direction) {
        let is_server_port = |p: u16| p == SMB_DIRECT_PORT || p == NETBIOS_SESSION_PORT;
        let dst_is_server = match (is_server_port(src.port()), is_server_port(dst.port())) {
            (false, true) => true,
            (true, false) => false,
            _ => dst.port() <= src.port(),
        };
        if dst_is_server {
            (Self::new(src, dst, transport), Direction::ToServer)
        } else {
            (Self::new(dst, src, transport), Direction::ToClient)
        }
    }
}

/// Correlation key for outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PidMid {
    pub pid: u32,
    pub mid: u16,
}

impl PidMid {
    pub fn new(pid: u32, mid: u16) -> Self {
        Self { pid, mid }
    }
}

/// Index of a request in its conversation's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExchangeState {
    AwaitingResponse,
    /// A partial response arrived; more responses or secondaries follow.
    Continued,
    Completed,
    /// Replaced by a newer request or evicted before completion.
    Abandoned,
}

/// What a tree connection is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceKind {
    Normal,
    Ipc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionContext {
    pub kind: TransactionKind,
    /// Trans/Trans2 `Setup[0]` or the NT Transact function.
    pub subcommand: Option<u16>,
    /// Pipe or mailslot name of a Trans request.
    pub name: Option<String>,
}

/// Per-command facts remembered from the request for interpreting its
/// response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RequestContext {
    pub fid: Option<u16>,
    pub transaction: Option<TransactionContext>,
    pub tree_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub request_frame_id: FrameId,
    pub pid_mid: PidMid,
    pub command: u8,
    pub request_time_us: u64,
    pub state: ExchangeState,
    /// Latest response frame linked to this request.
    pub response_frame_id: Option<FrameId>,
    pub response_time_us: Option<u64>,
    pub context: RequestContext,
}

/// Where a frame's transaction payload came from, so a replay can produce
/// it again without touching reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Built from the frame's own bytes.
    Single(ReassemblyKey),
    /// Completed by this frame; stored in the reassembler.
    Reassembled(ReassemblyKey),
}

/// Facts captured for a frame on the first pass.
#[derive(Debug, Clone, Default)]
pub struct FrameRecord {
    pub service: Option<ServiceKind>,
    pub raw_ntlmssp: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub emission: Option<Emission>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub requests: u64,
    pub pending: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub evicted: u64,
    pub orphan_responses: u64,
    pub duplicate_responses: u64,
    pub unknown_originals: u64,
    pub reassembling: u64,
    /// Bytes held by unfinished transactions.
    pub reassembly_bytes: u64,
}

impl std::ops::AddAssign for ConversationStats {
    fn add_assign(&mut self, o: Self) {
        self.requests += o.requests;
        self.pending += o.pending;
        self.completed += o.completed;
        self.abandoned += o.abandoned;
        self.evicted += o.evicted;
        self.orphan_responses += o.orphan_responses;
        self.duplicate_responses += o.duplicate_responses;
        self.unknown_originals += o.unknown_originals;
        self.reassembling += o.reassembling;
        self.reassembly_bytes += o.reassembly_bytes;
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    key: ConversationKey,
    max_pending: Option<usize>,
    pub(crate) requests: Vec<PendingRequest>,
    pub(crate) unmatched: HashMap<PidMid, RequestId>,
    /// Outstanding requests by request frame, oldest first.
    pub(crate) pending_order: BTreeMap<FrameId, PidMid>,
    pub(crate) matched: HashMap<(FrameId, PidMid), ExchangeLink>,
    /// Last completed request per key, for recognising duplicate responses.
    pub(crate) last_completed: HashMap<PidMid, RequestId>,
    tid_service: HashMap<u16, ServiceKind>,
    raw_ntlmssp: bool,
    frames: HashMap<FrameId, FrameRecord>,
    pub(crate) reassembler: Reassembler,
    pub(crate) stats: ConversationStats,
}

impl Conversation {
    pub fn new(key: ConversationKey, max_pending: Option<usize>, max_reassembly_bytes: usize) -> Self {
        Self {
            key,
            max_pending,
            requests: Vec::new(),
            unmatched: HashMap::new(),
            pending_order: BTreeMap::new(),
            matched: HashMap::new(),
            last_completed: HashMap::new(),
            tid_service: HashMap::new(),
            raw_ntlmssp: false,
            frames: HashMap::new(),
            reassembler: Reassembler::new(max_reassembly_bytes),
            stats: ConversationStats::default(),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn request(&self, id: RequestId) -> Option<&PendingRequest> {
        self.requests.get(id.0)
    }

    /// The request a frame was linked to on the first pass.
    pub fn linked_request(&self, frame: FrameId, k: PidMid) -> Option<&PendingRequest> {
        self.matched.get(&(frame, k)).and_then(|link| self.request(link.request))
    }

    pub(crate) fn request_mut(&mut self, id: RequestId) -> Option<&mut PendingRequest> {
        self.requests.get_mut(id.0)
    }

    /// The request currently outstanding under `k`.
    pub fn outstanding(&self, k: PidMid) -> Option<&PendingRequest> {
        self.unmatched.get(&k).and_then(|id| self.request(*id))
    }

    pub(crate) fn push_request(&mut self, req: PendingRequest) -> RequestId {
        let id = RequestId(self.requests.len());
        self.unmatched.insert(req.pid_mid, id);
        self.pending_order.insert(req.request_frame_id, req.pid_mid);
        self.requests.push(req);
        self.stats.requests += 1;
        id
    }

    /// Take `k` out of the outstanding table.
    pub(crate) fn retire(&mut self, k: PidMid, id: RequestId) {
        if self.unmatched.get(&k) == Some(&id) {
            self.unmatched.remove(&k);
        }
        if let Some(frame) = self.request(id).map(|r| r.request_frame_id) {
            self.pending_order.remove(&frame);
        }
    }

    pub(crate) fn abandon(&mut self, k: PidMid, id: RequestId, reason: AbandonReason) -> Diagnostic {
        self.retire(k, id);
        let request_frame = match self.request_mut(id) {
            Some(req) => {
                req.state = ExchangeState::Abandoned;
                req.request_frame_id
            }
            None => 0,
        };
        self.reassembler.discard(request_frame);
        match reason {
            AbandonReason::Evicted => self.stats.evicted += 1,
            _ => self.stats.abandoned += 1,
        }
        debug!(request_frame, ?reason, pid = k.pid, mid = k.mid, "request abandoned");
        if reason == AbandonReason::Evicted {
            Diagnostic::RequestEvicted { request_frame }
        } else {
            Diagnostic::RequestAbandoned { request_frame, reason }
        }
    }

    /// Evict the oldest outstanding requests until the cap holds.
    pub(crate) fn enforce_cap(&mut self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let Some(cap) = self.max_pending else { return out };
        while self.unmatched.len() > cap {
            let Some((_, k)) = self.pending_order.pop_first() else { break };
            if let Some(&id) = self.unmatched.get(&k) {
                out.push(self.abandon(k, id, AbandonReason::Evicted));
            }
        }
        out
    }

    pub fn pending_count(&self) -> usize {
        self.unmatched.len()
    }

    /// Service kind learned for `tid`, if any.
    pub fn service_for(&self, tid: u16) -> Option<ServiceKind> {
        self.tid_service.get(&tid).copied()
    }

    pub(crate) fn learn_service(&mut self, tid: u16, kind: ServiceKind) {
        debug!(tid, ?kind, "tree connected");
        self.tid_service.insert(tid, kind);
    }

    pub(crate) fn forget_service(&mut self, tid: u16) {
        if self.tid_service.remove(&tid).is_some() {
            debug!(tid, "tree disconnected");
        }
    }

    pub fn raw_ntlmssp(&self) -> bool {
        self.raw_ntlmssp
    }

    pub(crate) fn set_raw_ntlmssp(&mut self) {
        if !self.raw_ntlmssp {
            debug!("raw NTLMSSP session setup seen");
        }
        self.raw_ntlmssp = true;
    }

    pub fn frame_record(&self, frame_id: FrameId) -> Option<&FrameRecord> {
        self.frames.get(&frame_id)
    }

    pub(crate) fn record_frame(&mut self, frame_id: FrameId, record: FrameRecord) {
        self.frames.insert(frame_id, record);
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn stats(&self) -> ConversationStats {
        ConversationStats {
            pending: self.unmatched.len() as u64,
            reassembling: self.reassembler.in_progress_count() as u64,
            reassembly_bytes: self.reassembler.buffered_bytes() as u64,
            ..self.stats
        }
    }
}

/// All conversations of one capture session.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    max_pending: Option<usize>,
    max_reassembly_bytes: usize,
    conversations: HashMap<ConversationKey, Conversation>,
}

impl ConversationStore {
    pub fn new(max_pending: Option<usize>, max_reassembly_bytes: usize) -> Self {
        Self {
            max_pending,
            max_reassembly_bytes,
            conversations: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, key: ConversationKey) -> &mut Conversation {
        let (max_pending, max_bytes) = (self.max_pending, self.max_reassembly_bytes);
        self.conversations.entry(key).or_insert_with(|| {
            debug!(client = %key.client, server = %key.server, "new conversation");
            Conversation::new(key, max_pending, max_bytes)
        })
    }

    pub fn get(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.conversations.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
