//! Transaction reassembly.
//!
//! Trans, Trans2 and NT Transact split their parameter and data blocks over
//! several PDUs. Each fragment carries the declared totals plus, per block,
//! a chunk length and the chunk's displacement into the logical block.
//! Fragments may arrive in any order; the result is the same buffer either
//! way.
//!
//! State is keyed by the frame id of the request that opened the
//! transaction and the side (request or response) being reassembled, since
//! one request frame owns both the client's and the server's payload.
//!
//! A block is complete when the declared chunks cover `[0, total)`. When the
//! captured bytes fall short of what a chunk declared, the block still
//! completes and yields the contiguous prefix actually seen, flagged as
//! truncated.
//!
//! Buffers hold only the bytes actually received. Declared totals bound
//! what a block may grow to but are never allocated up front.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use super::FrameId;
use crate::protocol::commands::TransactionKind;

/// Which half of the exchange a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReassemblyKey {
    pub request_frame_id: FrameId,
    pub side: Side,
}

impl ReassemblyKey {
    pub fn new(request_frame_id: FrameId, side: Side) -> Self {
        Self { request_frame_id, side }
    }
}

/// One block's chunk as carried by a single PDU.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub displacement: u32,
    /// Length the PDU declared for this chunk.
    pub declared: u32,
    /// Bytes actually present; may be shorter than `declared`.
    pub bytes: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn empty() -> Self {
        Self { displacement: 0, declared: 0, bytes: &[] }
    }
}

/// One transaction PDU's contribution.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub kind: TransactionKind,
    pub total_param: u32,
    pub total_data: u32,
    pub param: Chunk<'a>,
    pub data: Chunk<'a>,
    /// Setup words; present on primary fragments only.
    pub setup: &'a [u8],
    /// The primary fragment fixes the totals.
    pub primary: bool,
}

impl<'a> Fragment<'a> {
    /// A primary fragment that declares both blocks in full.
    pub fn is_self_contained(&self) -> bool {
        self.primary
            && self.param.displacement == 0
            && self.data.displacement == 0
            && self.param.declared >= self.total_param
            && self.data.declared >= self.total_data
    }
}

fn serialize_len<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

/// A fully reassembled transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPayload {
    pub kind: TransactionKind,
    #[serde(rename = "parameter_len", serialize_with = "serialize_len")]
    pub parameters: Vec<u8>,
    #[serde(rename = "data_len", serialize_with = "serialize_len")]
    pub data: Vec<u8>,
    #[serde(rename = "setup_len", serialize_with = "serialize_len")]
    pub setup: Vec<u8>,
    /// Fewer bytes were captured than declared, or a total exceeded the
    /// configured cap.
    pub truncated: bool,
    /// Number of PDUs that contributed.
    pub fragments: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    Incomplete,
    /// Emitted once, by the fragment that completed the payload.
    Complete(TransactionPayload),
    /// The payload was already emitted; the fragment is ignored.
    AlreadyComplete,
}

/// Sorted, non-overlapping, non-adjacent ranges.
#[derive(Debug, Clone, Default)]
struct IntervalSet {
    ranges: Vec<Range<usize>>,
}

impl IntervalSet {
    fn insert(&mut self, r: Range<usize>) {
        if r.is_empty() {
            return;
        }
        let mut merged = r;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for cur in self.ranges.drain(..) {
            if cur.end < merged.start {
                out.push(cur);
            } else if merged.end < cur.start {
                if !placed {
                    out.push(merged.clone());
                    placed = true;
                }
                out.push(cur);
            } else {
                merged = merged.start.min(cur.start)..merged.end.max(cur.end);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.ranges = out;
    }

    /// Length of the run starting at 0.
    fn prefix(&self) -> usize {
        match self.ranges.first() {
            Some(r) if r.start == 0 => r.end,
            _ => 0,
        }
    }

    fn covers(&self, total: usize) -> bool {
        total == 0 || self.prefix() >= total
    }
}

#[derive(Debug, Clone)]
struct BlockBuffer {
    total: usize,
    truncated: bool,
    /// Received chunks as `(displacement, bytes)`, in arrival order.
    chunks: Vec<(usize, Vec<u8>)>,
    declared: IntervalSet,
    received: IntervalSet,
}

impl BlockBuffer {
    fn new(declared_total: u32, cap: usize) -> Self {
        let mut b = Self {
            total: 0,
            truncated: false,
            chunks: Vec::new(),
            declared: IntervalSet::default(),
            received: IntervalSet::default(),
        };
        b.set_total(declared_total, cap);
        b
    }

    fn set_total(&mut self, declared_total: u32, cap: usize) {
        let declared_total = declared_total as usize;
        self.total = declared_total.min(cap);
        self.truncated |= declared_total > cap;
    }

    fn add(&mut self, chunk: &Chunk<'_>) {
        let start = chunk.displacement as usize;
        let declared_end = start.saturating_add(chunk.declared as usize);
        if declared_end > self.total {
            self.truncated = true;
        }
        if chunk.bytes.len() < chunk.declared as usize {
            self.truncated = true;
        }
        let declared_end = declared_end.min(self.total);
        if start >= declared_end {
            return;
        }
        self.declared.insert(start..declared_end);

        let avail = chunk.bytes.len().min(declared_end - start);
        if avail == 0 {
            return;
        }
        self.chunks.push((start, chunk.bytes[..avail].to_vec()));
        self.received.insert(start..start + avail);
    }

    fn buffered(&self) -> usize {
        self.chunks.iter().map(|(_, b)| b.len()).sum()
    }

    fn is_complete(&self) -> bool {
        self.declared.covers(self.total)
    }

    fn finish(self) -> (Vec<u8>, bool) {
        let got = self.received.prefix().min(self.total);
        let mut buf = vec![0; got];
        // Later chunks overwrite overlapping earlier ones.
        for (start, bytes) in &self.chunks {
            if *start >= got {
                continue;
            }
            let n = bytes.len().min(got - start);
            buf[*start..start + n].copy_from_slice(&bytes[..n]);
        }
        (buf, self.truncated || got < self.total)
    }
}

#[derive(Debug, Clone)]
struct ReassemblyState {
    kind: TransactionKind,
    have_primary: bool,
    param: BlockBuffer,
    data: BlockBuffer,
    setup: Vec<u8>,
    fragments: u32,
}

impl ReassemblyState {
    fn is_complete(&self) -> bool {
        self.have_primary && self.param.is_complete() && self.data.is_complete()
    }
}

/// Frame that completed a payload, and the payload itself.
#[derive(Debug, Clone)]
struct Completion {
    frame_id: FrameId,
    payload: TransactionPayload,
}

/// Per-conversation reassembly buffers.
#[derive(Debug, Clone)]
pub struct Reassembler {
    max_block_bytes: usize,
    in_progress: HashMap<ReassemblyKey, ReassemblyState>,
    completed: HashMap<ReassemblyKey, Completion>,
}

impl Reassembler {
    pub fn new(max_block_bytes: usize) -> Self {
        Self {
            max_block_bytes,
            in_progress: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    /// Payload of a fragment that declares everything itself. Nothing is
    /// stored.
    pub fn assemble_single(&self, fragment: &Fragment<'_>) -> TransactionPayload {
        let mut param = BlockBuffer::new(fragment.total_param, self.max_block_bytes);
        let mut data = BlockBuffer::new(fragment.total_data, self.max_block_bytes);
        param.add(&fragment.param);
        data.add(&fragment.data);
        let (parameters, pt) = param.finish();
        let (data, dt) = data.finish();
        TransactionPayload {
            kind: fragment.kind,
            parameters,
            data,
            setup: fragment.setup.to_vec(),
            truncated: pt || dt,
            fragments: 1,
        }
    }

    /// Feed one fragment belonging to `key`, arriving in `frame_id`.
    pub fn on_fragment(&mut self, key: ReassemblyKey, frame_id: FrameId, fragment: &Fragment<'_>) -> FragmentOutcome {
        if self.completed.contains_key(&key) {
            trace!(?key, frame_id, "fragment after completion ignored");
            return FragmentOutcome::AlreadyComplete;
        }
        if !self.in_progress.contains_key(&key) && fragment.is_self_contained() {
            let payload = self.assemble_single(fragment);
            self.completed.insert(key, Completion { frame_id, payload: payload.clone() });
            return FragmentOutcome::Complete(payload);
        }

        let cap = self.max_block_bytes;
        let state = self.in_progress.entry(key).or_insert_with(|| ReassemblyState {
            kind: fragment.kind,
            have_primary: false,
            param: BlockBuffer::new(fragment.total_param, cap),
            data: BlockBuffer::new(fragment.total_data, cap),
            setup: Vec::new(),
            fragments: 0,
        });

        if fragment.primary && !state.have_primary {
            state.have_primary = true;
            state.param.set_total(fragment.total_param, cap);
            state.data.set_total(fragment.total_data, cap);
            state.setup = fragment.setup.to_vec();
        }
        state.param.add(&fragment.param);
        state.data.add(&fragment.data);
        state.fragments += 1;

        if !state.is_complete() {
            trace!(?key, frame_id, fragments = state.fragments, "transaction incomplete");
            return FragmentOutcome::Incomplete;
        }

        let Some(state) = self.in_progress.remove(&key) else {
            return FragmentOutcome::Incomplete;
        };
        let (parameters, pt) = state.param.finish();
        let (data, dt) = state.data.finish();
        let payload = TransactionPayload {
            kind: state.kind,
            parameters,
            data,
            setup: state.setup,
            truncated: pt || dt,
            fragments: state.fragments,
        };
        debug!(?key, frame_id, fragments = payload.fragments, truncated = payload.truncated, "transaction reassembled");
        self.completed.insert(key, Completion { frame_id, payload: payload.clone() });
        FragmentOutcome::Complete(payload)
    }

    /// The payload completed by `frame_id` under `key`, for a replay pass.
    pub fn completed_at(&self, key: &ReassemblyKey, frame_id: FrameId) -> Option<&TransactionPayload> {
        self.completed
            .get(key)
            .filter(|c| c.frame_id == frame_id)
            .map(|c| &c.payload)
    }

    pub fn is_complete(&self, key: &ReassemblyKey) -> bool {
        self.completed.contains_key(key)
    }

    pub fn is_in_progress(&self, key: &ReassemblyKey) -> bool {
        self.in_progress.contains_key(key)
    }

    /// Drop unfinished buffers for an abandoned request.
    pub fn discard(&mut self, request_frame_id: FrameId) {
        for side in [Side::Request, Side::Response] {
            if self.in_progress.remove(&ReassemblyKey::new(request_frame_id, side)).is_some() {
                debug!(request_frame_id, ?side, "discarded partial transaction");
            }
        }
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    /// Bytes held by unfinished transactions.
    pub fn buffered_bytes(&self) -> usize {
        self.in_progress
            .values()
            .map(|s| s.param.buffered() + s.data.buffered())
            .sum()
    }
}
