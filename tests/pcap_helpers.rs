#![allow(dead_code)]
//! Helpers for programmatically generating test PCAP files that carry
//! SMB1 traffic over TCP 445 or NetBIOS session service on 139.
//!
//! The generated PCAPs are minimal but structurally valid:
//!   Global header + N×(Packet header + Ethernet + IPv4 + TCP + payload).
//! Payload bytes are raw stream bytes, so tests control how PDUs are
//! split across segments and in what order segments arrive.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

// ── PCAP global header (24 bytes) ──

const PCAP_MAGIC: u32 = 0xa1b2_c3d4; // microsecond resolution
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65535;
const PCAP_LINKTYPE_ETHERNET: u32 = 1;

pub const TCP_SYN: u8 = 0x02;
pub const TCP_PSH_ACK: u8 = 0x18;
pub const TCP_SYN_ACK: u8 = 0x12;

pub const NBSS_SESSION_REQUEST: u8 = 0x81;
pub const NBSS_POSITIVE_RESPONSE: u8 = 0x82;
pub const NBSS_KEEP_ALIVE: u8 = 0x85;

fn pcap_global_header() -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
    h.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
    h.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
    h.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    h.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    h.extend_from_slice(&PCAP_SNAPLEN.to_le_bytes());
    h.extend_from_slice(&PCAP_LINKTYPE_ETHERNET.to_le_bytes());
    h
}

fn pcap_packet_header(ts_us: u64, len: u32) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&((ts_us / 1_000_000) as u32).to_le_bytes());
    h.extend_from_slice(&((ts_us % 1_000_000) as u32).to_le_bytes());
    h.extend_from_slice(&len.to_le_bytes()); // incl_len
    h.extend_from_slice(&len.to_le_bytes()); // orig_len
    h
}

// ── Ethernet + IPv4 + TCP ──

fn build_eth_ipv4_tcp(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut pkt = Vec::new();

    // Ethernet (14 bytes)
    pkt.extend_from_slice(&[0u8; 6]); // dst MAC
    pkt.extend_from_slice(&[0u8; 6]); // src MAC
    pkt.extend_from_slice(&0x0800u16.to_be_bytes());

    // IPv4 (20 bytes)
    let total_len = (20 + 20 + payload.len()) as u16;
    pkt.push(0x45); // version=4, IHL=5
    pkt.push(0);
    pkt.extend_from_slice(&total_len.to_be_bytes());
    pkt.extend_from_slice(&[0; 4]); // id, flags, frag
    pkt.push(64); // TTL
    pkt.push(6); // TCP
    pkt.extend_from_slice(&[0; 2]); // checksum
    pkt.extend_from_slice(&src_ip.octets());
    pkt.extend_from_slice(&dst_ip.octets());

    // TCP (20 bytes)
    pkt.extend_from_slice(&src_port.to_be_bytes());
    pkt.extend_from_slice(&dst_port.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&0u32.to_be_bytes()); // ack
    pkt.push(0x50); // data offset = 5 words
    pkt.push(flags);
    pkt.extend_from_slice(&8192u16.to_be_bytes()); // window
    pkt.extend_from_slice(&[0; 2]); // checksum
    pkt.extend_from_slice(&[0; 2]); // urgent

    pkt.extend_from_slice(payload);
    pkt
}

/// Session message framing: type 0 and a length. The same four bytes work
/// for direct TCP (24-bit length) and NetBIOS (17-bit length) below 64 KiB.
pub fn session_message(pdu: &[u8]) -> Vec<u8> {
    let len = pdu.len() as u32;
    let mut v = Vec::with_capacity(4 + pdu.len());
    v.push(0x00);
    v.extend_from_slice(&len.to_be_bytes()[1..]);
    v.extend_from_slice(pdu);
    v
}

/// A NetBIOS session packet of another type.
pub fn session_packet(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut v = vec![kind, 0];
    v.extend_from_slice(&(body.len() as u16).to_be_bytes());
    v.extend_from_slice(body);
    v
}

// ── High-level PCAP generation ──

/// Builds one TCP connection's worth of packets.
pub struct PcapBuilder {
    client: (Ipv4Addr, u16),
    server: (Ipv4Addr, u16),
    client_seq: u32,
    server_seq: u32,
    ts_us: u64,
    records: Vec<u8>,
    packets: usize,
}

impl PcapBuilder {
    pub fn new(client_port: u16, server_port: u16) -> Self {
        Self {
            client: (Ipv4Addr::new(10, 0, 0, 1), client_port),
            server: (Ipv4Addr::new(10, 0, 0, 2), server_port),
            client_seq: 1000,
            server_seq: 5000,
            ts_us: 1_700_000_000_000_000,
            records: Vec::new(),
            packets: 0,
        }
    }

    fn push(&mut self, from_client: bool, seq: u32, flags: u8, payload: &[u8]) {
        let (src, dst) = if from_client { (self.client, self.server) } else { (self.server, self.client) };
        let eth = build_eth_ipv4_tcp(src.0, dst.0, src.1, dst.1, seq, flags, payload);
        self.records.extend(pcap_packet_header(self.ts_us, eth.len() as u32));
        self.records.extend(&eth);
        self.ts_us += 1000;
        self.packets += 1;
    }

    /// SYN and SYN-ACK. Each consumes one sequence number.
    pub fn handshake(&mut self) {
        self.push(true, self.client_seq, TCP_SYN, &[]);
        self.client_seq += 1;
        self.push(false, self.server_seq, TCP_SYN_ACK, &[]);
        self.server_seq += 1;
    }

    /// Raw stream bytes from the client in one segment.
    pub fn client_bytes(&mut self, bytes: &[u8]) {
        self.push(true, self.client_seq, TCP_PSH_ACK, bytes);
        self.client_seq += bytes.len() as u32;
    }

    pub fn server_bytes(&mut self, bytes: &[u8]) {
        self.push(false, self.server_seq, TCP_PSH_ACK, bytes);
        self.server_seq += bytes.len() as u32;
    }

    pub fn client_pdu(&mut self, pdu: &[u8]) {
        self.client_bytes(&session_message(pdu));
    }

    pub fn server_pdu(&mut self, pdu: &[u8]) {
        self.server_bytes(&session_message(pdu));
    }

    /// One client PDU split over two segments at `at`.
    pub fn client_pdu_split(&mut self, pdu: &[u8], at: usize) {
        let framed = session_message(pdu);
        self.client_bytes(&framed[..at]);
        self.client_bytes(&framed[at..]);
    }

    /// Server stream bytes sent as two segments, the second one first.
    pub fn server_bytes_reordered(&mut self, bytes: &[u8], at: usize) {
        let seq = self.server_seq;
        self.push(false, seq.wrapping_add(at as u32), TCP_PSH_ACK, &bytes[at..]);
        self.push(false, seq, TCP_PSH_ACK, &bytes[..at]);
        self.server_seq += bytes.len() as u32;
    }

    pub fn packet_count(&self) -> usize {
        self.packets
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        let mut data = pcap_global_header();
        data.extend_from_slice(&self.records);
        std::fs::write(path, data).expect("Failed to write PCAP");
        path.to_path_buf()
    }
}

/// Generate an empty but valid PCAP (global header only, no packets).
pub fn generate_empty_pcap(dir: &Path) -> PathBuf {
    let path = dir.join("empty.pcap");
    std::fs::write(&path, pcap_global_header()).expect("Failed to write empty.pcap");
    path
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("smbwire_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}
