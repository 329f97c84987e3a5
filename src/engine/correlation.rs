//! Request / response / continuation correlation.
//!
//! Requests are keyed by PID/MID. A fresh request replaces whatever was
//! outstanding under its key, since MIDs wrap and lossy captures drop
//! responses. The one exception is a compatible request arriving while the
//! outstanding exchange is `Continued`: it joins that exchange as a
//! continuation. A response links to the outstanding request under its key
//! when the commands agree. Continuations (transaction secondaries and NT
//! Cancel) only link; they never change the request they refer to.
//!
//! Every frame gets at most one link, recorded under `(frame, pid/mid)`, so
//! later lookups are a single hash probe and never mutate anything.
//! Response and continuation links carry the exchange state as it stood
//! when the frame was first processed.

use serde::Serialize;
use tracing::debug;

use super::conversation::{
    Conversation, ExchangeState, PendingRequest, PidMid, RequestContext, RequestId,
};
use super::FrameId;
use crate::protocol::commands::{response_matches, semantic_command, SMB1_COMMAND_NT_CANCEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbandonReason {
    /// A new request reused the key before any response arrived.
    Unanswered,
    /// A response or request under the key carried a different command.
    CommandMismatch,
    /// Dropped by the outstanding-request cap.
    Evicted,
}

/// Correlation anomalies. None of these stop processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    RequestAbandoned { request_frame: FrameId, reason: AbandonReason },
    RequestEvicted { request_frame: FrameId },
    /// A response with no outstanding request under its key.
    OrphanResponse { pid: u32, mid: u16 },
    /// A response to an exchange that had already completed.
    DuplicateResponse { request_frame: FrameId },
    /// A continuation whose original request was never seen.
    OriginalRequestUnknown { pid: u32, mid: u16, command: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Request,
    Response,
    Continuation,
}

/// What is stored per frame. Response and continuation links keep their
/// own state snapshot; a request link reads everything from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeLink {
    pub request: RequestId,
    pub role: Role,
    pub frame_time_us: u64,
    /// `None` only for `Role::Request`.
    pub state: Option<ExchangeState>,
}

/// The resolved view of a frame's link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatedExchange {
    pub frame_id: FrameId,
    pub role: Role,
    pub command: u8,
    pub pid: u32,
    pub mid: u16,
    pub request_frame_id: FrameId,
    pub response_frame_id: Option<FrameId>,
    /// Set for continuations: the request they continue.
    pub continuation_of: Option<FrameId>,
    pub latency_us: Option<u64>,
    pub state: ExchangeState,
}

/// Result of looking up the request a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMatch {
    Linked(RequestId),
    Unlinked,
}

impl Conversation {
    fn link(&mut self, frame: FrameId, k: PidMid, request: RequestId, role: Role, time_us: u64) {
        let state = match role {
            Role::Request => None,
            Role::Response | Role::Continuation => self.request(request).map(|req| req.state),
        };
        self.matched.insert((frame, k), ExchangeLink { request, role, frame_time_us: time_us, state });
    }

    /// Record a new request. Whatever was outstanding under `k` is
    /// abandoned and reported, unless it is a `Continued` exchange with a
    /// compatible command, which the new frame joins instead.
    pub fn on_request(
        &mut self,
        frame: FrameId,
        k: PidMid,
        command: u8,
        time_us: u64,
        context: RequestContext,
    ) -> (RequestId, Vec<Diagnostic>) {
        if let Some(link) = self.matched.get(&(frame, k)) {
            return (link.request, Vec::new());
        }
        let mut diagnostics = Vec::new();

        let outstanding = self
            .unmatched
            .get(&k)
            .and_then(|id| self.request(*id).map(|req| (*id, req.state, req.command, req.request_frame_id)));
        if let Some((old, state, old_command, request_frame)) = outstanding {
            if state == ExchangeState::Continued && response_matches(command, old_command) {
                debug!(frame, request_frame, "request joins continued exchange");
                self.link(frame, k, old, Role::Continuation, time_us);
                return (old, diagnostics);
            }
            let reason = if state == ExchangeState::AwaitingResponse {
                AbandonReason::Unanswered
            } else {
                AbandonReason::CommandMismatch
            };
            diagnostics.push(self.abandon(k, old, reason));
        }

        let id = self.push_request(PendingRequest {
            request_frame_id: frame,
            pid_mid: k,
            command,
            request_time_us: time_us,
            state: ExchangeState::AwaitingResponse,
            response_frame_id: None,
            response_time_us: None,
            context,
        });
        self.link(frame, k, id, Role::Request, time_us);
        diagnostics.extend(self.enforce_cap());
        (id, diagnostics)
    }

    /// Find and link the request a response answers. The caller decides
    /// whether the response is final and then calls [`finish_response`].
    ///
    /// [`finish_response`]: Conversation::finish_response
    pub fn begin_response(
        &mut self,
        frame: FrameId,
        k: PidMid,
        command: u8,
        time_us: u64,
    ) -> (ResponseMatch, Vec<Diagnostic>) {
        if let Some(link) = self.matched.get(&(frame, k)) {
            return (ResponseMatch::Linked(link.request), Vec::new());
        }

        let Some(&id) = self.unmatched.get(&k) else {
            let previous = self
                .last_completed
                .get(&k)
                .and_then(|id| self.request(*id))
                .filter(|req| response_matches(command, req.command))
                .map(|req| req.request_frame_id);
            let diag = match previous {
                Some(request_frame) => {
                    self.stats.duplicate_responses += 1;
                    debug!(frame, request_frame, "duplicate response");
                    Diagnostic::DuplicateResponse { request_frame }
                }
                _ => {
                    self.stats.orphan_responses += 1;
                    debug!(frame, pid = k.pid, mid = k.mid, "response without request");
                    Diagnostic::OrphanResponse { pid: k.pid, mid: k.mid }
                }
            };
            return (ResponseMatch::Unlinked, vec![diag]);
        };

        let Some(req) = self.request(id) else {
            return (ResponseMatch::Unlinked, Vec::new());
        };
        if !response_matches(command, req.command) {
            let mut diagnostics = vec![self.abandon(k, id, AbandonReason::CommandMismatch)];
            self.stats.orphan_responses += 1;
            diagnostics.push(Diagnostic::OrphanResponse { pid: k.pid, mid: k.mid });
            return (ResponseMatch::Unlinked, diagnostics);
        }

        if let Some(req) = self.request_mut(id) {
            req.response_frame_id = Some(frame);
            req.response_time_us = Some(time_us);
        }
        self.link(frame, k, id, Role::Response, time_us);
        (ResponseMatch::Linked(id), Vec::new())
    }

    /// Settle the response in `frame`: a partial one leaves the request
    /// outstanding as `Continued`, a final one completes it. The resulting
    /// state is stored on the frame's link.
    pub fn finish_response(&mut self, frame: FrameId, k: PidMid, id: RequestId, incomplete: bool) {
        self.settle(k, id, incomplete);
        let state = self.request(id).map(|req| req.state);
        if let Some(link) = self.matched.get_mut(&(frame, k)) {
            link.state = state;
        }
    }

    fn settle(&mut self, k: PidMid, id: RequestId, incomplete: bool) {
        let Some(req) = self.request_mut(id) else { return };
        if req.state != ExchangeState::AwaitingResponse && req.state != ExchangeState::Continued {
            return;
        }
        if incomplete {
            req.state = ExchangeState::Continued;
            return;
        }
        req.state = ExchangeState::Completed;
        self.retire(k, id);
        self.last_completed.insert(k, id);
        self.stats.completed += 1;
    }

    /// Link a transaction secondary or NT Cancel to the request it refers
    /// to. The request itself is left untouched.
    pub fn on_continuation(
        &mut self,
        frame: FrameId,
        k: PidMid,
        command: u8,
        time_us: u64,
    ) -> (Option<RequestId>, Vec<Diagnostic>) {
        if let Some(link) = self.matched.get(&(frame, k)) {
            return (Some(link.request), Vec::new());
        }
        let found = self.unmatched.get(&k).copied().filter(|id| {
            self.request(*id).is_some_and(|req| {
                command == SMB1_COMMAND_NT_CANCEL || semantic_command(command) == semantic_command(req.command)
            })
        });
        match found {
            Some(id) => {
                self.link(frame, k, id, Role::Continuation, time_us);
                (Some(id), Vec::new())
            }
            None => {
                self.stats.unknown_originals += 1;
                debug!(frame, pid = k.pid, mid = k.mid, command, "continuation of unknown request");
                (None, vec![Diagnostic::OriginalRequestUnknown { pid: k.pid, mid: k.mid, command }])
            }
        }
    }

    /// Read-only lookup of a frame's link.
    pub fn exchange(&self, frame: FrameId, k: PidMid) -> Option<CorrelatedExchange> {
        let link = self.matched.get(&(frame, k))?;
        let req = self.request(link.request)?;
        let (response_frame_id, latency_us, continuation_of) = match link.role {
            Role::Request => (
                req.response_frame_id,
                req.response_time_us.map(|t| t.saturating_sub(req.request_time_us)),
                None,
            ),
            Role::Response => (
                Some(frame),
                Some(link.frame_time_us.saturating_sub(req.request_time_us)),
                None,
            ),
            Role::Continuation => (None, None, Some(req.request_frame_id)),
        };
        Some(CorrelatedExchange {
            frame_id: frame,
            role: link.role,
            command: req.command,
            pid: k.pid,
            mid: k.mid,
            request_frame_id: req.request_frame_id,
            response_frame_id,
            continuation_of,
            latency_us,
            state: link.state.unwrap_or(req.state),
        })
    }
}
