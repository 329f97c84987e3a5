//! Capture front end.
//!
//! ## Pipeline
//!
//! ```text
//! pcap file
//!   → PcapReader (frames)
//!   → TcpReassembler (newly contiguous bytes per half-connection)
//!   → NbssFramer (session-service framing → PDU bytes)
//!   → CapturedPdu (conversation key, frame id, direction)
//!   → Dissector::process (first pass, then any number of replays)
//! ```

pub mod nbss;
pub mod pcap_reader;
pub mod tcp_reassembly;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::conversation::{ConversationKey, Transport, NETBIOS_SESSION_PORT};
use crate::engine::{Direction, Dissector, FrameId, FrameInfo, Pass, PduOutcome};
use crate::error::DissectError;

pub use nbss::NbssFramer;
pub use pcap_reader::{Packet, PcapReader};
pub use tcp_reassembly::TcpReassembler;

/// One PDU cut out of a capture.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedPdu {
    pub key: ConversationKey,
    /// Sequence number of the PDU in the capture. Unique even when one
    /// packet carries several PDUs.
    pub frame_id: FrameId,
    /// Index of the packet that completed the PDU.
    pub packet_index: u64,
    pub timestamp_us: u64,
    pub direction: Direction,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl CapturedPdu {
    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo::new(self.frame_id, self.timestamp_us).with_direction(self.direction)
    }
}

/// Turns packets into PDUs.
#[derive(Default)]
pub struct CaptureSession {
    tcp: TcpReassembler,
    framers: HashMap<(ConversationKey, Direction), NbssFramer>,
    packets: u64,
    next_frame: FrameId,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet; returns the PDUs it completed.
    pub fn push_packet(&mut self, packet: &Packet) -> Vec<CapturedPdu> {
        self.packets += 1;
        let packet_index = self.packets;
        let Some(chunk) = self.tcp.process_packet(packet) else {
            return Vec::new();
        };
        let transport = match chunk.id.server_port() {
            Some(NETBIOS_SESSION_PORT) => Transport::NetbiosSession,
            _ => Transport::DirectTcp,
        };
        let (key, direction) = ConversationKey::from_endpoints(chunk.id.src, chunk.id.dst, transport);
        let framer = self
            .framers
            .entry((key, direction))
            .or_insert_with(|| NbssFramer::new(transport));

        let mut out = Vec::new();
        for bytes in framer.push(&chunk.data) {
            self.next_frame += 1;
            out.push(CapturedPdu {
                key,
                frame_id: self.next_frame,
                packet_index,
                timestamp_us: chunk.timestamp_us,
                direction,
                bytes,
            });
        }
        out
    }

    pub fn packet_count(&self) -> u64 {
        self.packets
    }
}

/// Read every PDU from a pcap file.
pub fn read_capture(path: impl AsRef<Path>) -> Result<Vec<CapturedPdu>> {
    let reader = PcapReader::new(path.as_ref())?;
    let mut session = CaptureSession::new();
    let mut pdus = Vec::new();
    for packet in reader.packets()? {
        pdus.extend(session.push_packet(&packet?));
    }
    info!(packets = session.packet_count(), pdus = pdus.len(), "capture read");
    Ok(pdus)
}

/// Run `pdus` through `dissector` for one pass. PDUs of other protocols
/// (SMB2 on port 445) are skipped.
pub fn run_pass(dissector: &mut Dissector, pdus: &[CapturedPdu], pass: Pass) -> Vec<PduOutcome> {
    let mut outcomes = Vec::with_capacity(pdus.len());
    for pdu in pdus {
        match dissector.process(pdu.key, pdu.frame_info(), &pdu.bytes, pass) {
            Ok(outcome) => outcomes.push(outcome),
            Err(DissectError::NotThisProtocol) => {}
            Err(e) => debug!(frame = pdu.frame_id, error = %e, "PDU skipped"),
        }
    }
    outcomes
}
