//! Incremental TCP stream reassembly.
//!
//! Parses Ethernet, IPv4/IPv6 and TCP headers and orders payload bytes per
//! half-connection by sequence number. Each packet yields the bytes that
//! became contiguous because of it, so PDUs can be framed and timestamped
//! as they complete. Only connections on TCP 445 or 139 are kept.
//!
//! Reference: RFC 793 (TCP), RFC 791 (IPv4), RFC 8200 (IPv6).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::trace;

use super::pcap_reader::Packet;
use crate::engine::conversation::{NETBIOS_SESSION_PORT, SMB_DIRECT_PORT};

/// One TCP half-connection.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct StreamId {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

impl StreamId {
    /// The port of the SMB server side, if either end is on one.
    pub fn server_port(&self) -> Option<u16> {
        [self.dst.port(), self.src.port()]
            .into_iter()
            .find(|p| *p == SMB_DIRECT_PORT || *p == NETBIOS_SESSION_PORT)
    }
}

/// Bytes that became contiguous on one half-connection.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub id: StreamId,
    pub timestamp_us: u64,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct StreamBuffer {
    /// Out-of-order segments keyed by sequence number.
    segments: BTreeMap<u32, Vec<u8>>,
    next_seq: Option<u32>,
}

impl StreamBuffer {
    /// Add a segment and return whatever is now in order.
    fn add_segment(&mut self, seq: u32, data: &[u8]) -> Vec<u8> {
        let expected = *self.next_seq.get_or_insert(seq);
        let end = seq.wrapping_add(data.len() as u32);
        if !seq_before(expected, end) {
            // retransmission of bytes already delivered
            return Vec::new();
        }
        let (seq, data) = if seq_before(seq, expected) {
            (expected, &data[expected.wrapping_sub(seq) as usize..])
        } else {
            (seq, data)
        };
        let slot = self.segments.entry(seq).or_default();
        if slot.len() < data.len() {
            *slot = data.to_vec();
        }
        self.drain_in_order()
    }

    fn drain_in_order(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let Some(mut expected) = self.next_seq else { return out };
        while let Some(data) = self.segments.remove(&expected) {
            expected = expected.wrapping_add(data.len() as u32);
            out.extend_from_slice(&data);
        }
        self.next_seq = Some(expected);
        out
    }
}

/// True when `a` is strictly before `b` in sequence space.
fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

// ── Ethernet / IP / TCP parsing ──

fn parse_ethernet(data: &[u8]) -> Option<(u16, &[u8])> {
    if data.len() < 14 {
        return None;
    }
    let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
    let mut rest = &data[14..];
    // single 802.1Q tag
    if ethertype == 0x8100 && rest.len() >= 4 {
        ethertype = u16::from_be_bytes([rest[2], rest[3]]);
        rest = &rest[4..];
    }
    Some((ethertype, rest))
}

fn parse_ipv4(data: &[u8]) -> Option<(Ipv4Addr, Ipv4Addr, u8, &[u8])> {
    if data.len() < 20 {
        return None;
    }
    let ihl = (data[0] & 0x0F) as usize * 4;
    let total = u16::from_be_bytes([data[2], data[3]]) as usize;
    if data.len() < ihl || ihl < 20 {
        return None;
    }
    // Ethernet padding follows short datagrams.
    let end = if total >= ihl { total.min(data.len()) } else { data.len() };
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    Some((src, dst, data[9], &data[ihl..end]))
}

fn parse_ipv6(data: &[u8]) -> Option<(Ipv6Addr, Ipv6Addr, u8, &[u8])> {
    if data.len() < 40 {
        return None;
    }
    let payload_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    let src = Ipv6Addr::from(<[u8; 16]>::try_from(&data[8..24]).ok()?);
    let dst = Ipv6Addr::from(<[u8; 16]>::try_from(&data[24..40]).ok()?);
    let end = (40 + payload_len).min(data.len());
    Some((src, dst, data[6], &data[40..end]))
}

struct TcpHeader {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    flags: u8,
}

fn parse_tcp(data: &[u8]) -> Option<(TcpHeader, &[u8])> {
    if data.len() < 20 {
        return None;
    }
    let data_offset = ((data[12] >> 4) as usize) * 4;
    if data.len() < data_offset {
        return None;
    }
    Some((
        TcpHeader {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            flags: data[13],
        },
        &data[data_offset..],
    ))
}

pub const TCP_FLAG_SYN: u8 = 0x02;

/// Reassembles SMB TCP streams packet by packet.
#[derive(Default)]
pub struct TcpReassembler {
    streams: HashMap<StreamId, StreamBuffer>,
}

impl TcpReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one Ethernet frame. Returns the newly contiguous payload, if
    /// the frame belongs to an SMB connection and completed any.
    pub fn process_packet(&mut self, packet: &Packet) -> Option<StreamChunk> {
        let (ethertype, ip_data) = parse_ethernet(&packet.data)?;
        let (src_ip, dst_ip, proto, tcp_data) = match ethertype {
            0x0800 => {
                let (s, d, proto, rest) = parse_ipv4(ip_data)?;
                (IpAddr::V4(s), IpAddr::V4(d), proto, rest)
            }
            0x86DD => {
                let (s, d, proto, rest) = parse_ipv6(ip_data)?;
                (IpAddr::V6(s), IpAddr::V6(d), proto, rest)
            }
            _ => return None,
        };
        if proto != 6 {
            return None;
        }
        let (tcp, payload) = parse_tcp(tcp_data)?;
        let id = StreamId {
            src: SocketAddr::new(src_ip, tcp.src_port),
            dst: SocketAddr::new(dst_ip, tcp.dst_port),
        };
        id.server_port()?;

        let buf = self.streams.entry(id).or_default();
        if tcp.flags & TCP_FLAG_SYN != 0 {
            // SYN consumes one sequence number.
            buf.next_seq = Some(tcp.seq.wrapping_add(1));
            buf.segments.clear();
        }
        if payload.is_empty() {
            return None;
        }
        let data = buf.add_segment(tcp.seq, payload);
        trace!(stream = ?id, seq = tcp.seq, len = payload.len(), delivered = data.len(), "tcp segment");
        if data.is_empty() {
            return None;
        }
        Some(StreamChunk { id, timestamp_us: packet.timestamp_us, data })
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}
