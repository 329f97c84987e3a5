//! Legacy pcap reading.
//!
//! Streams link-layer frames from a libpcap file with the `pcap-parser`
//! crate. Timestamps are normalised to microseconds whatever the file's
//! resolution.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};

/// Magic number of nanosecond-resolution pcap files.
const PCAP_MAGIC_NSEC: u32 = 0xa1b2_3c4d;

/// One captured frame.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Capture timestamp in microseconds since the epoch.
    pub timestamp_us: u64,
    /// Link-layer bytes (Ethernet).
    pub data: Vec<u8>,
}

pub struct PcapReader {
    path: PathBuf,
}

impl PcapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::metadata(&path).with_context(|| format!("pcap file not found: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn packets(&self) -> Result<PacketIterator> {
        PacketIterator::new(&self.path)
    }
}

pub struct PacketIterator {
    reader: LegacyPcapReader<BufReader<File>>,
    nanosecond: bool,
    done: bool,
}

impl PacketIterator {
    fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open pcap: {}", path.display()))?;
        let buf = BufReader::with_capacity(256 * 1024, file);
        let reader =
            LegacyPcapReader::new(65536, buf).map_err(|e| anyhow!("failed to create pcap reader: {:?}", e))?;
        Ok(Self { reader, nanosecond: false, done: false })
    }
}

fn timestamp_us(nanosecond: bool, ts_sec: u32, ts_frac: u32) -> u64 {
    let frac_us = if nanosecond { ts_frac as u64 / 1000 } else { ts_frac as u64 };
    ts_sec as u64 * 1_000_000 + frac_us
}

impl Iterator for PacketIterator {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut refilled = false;
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    refilled = false;
                    let packet = match block {
                        PcapBlockOwned::LegacyHeader(hdr) => {
                            self.nanosecond = hdr.magic_number == PCAP_MAGIC_NSEC;
                            None
                        }
                        PcapBlockOwned::Legacy(pkt) => Some(Packet {
                            timestamp_us: timestamp_us(self.nanosecond, pkt.ts_sec, pkt.ts_usec),
                            data: pkt.data.to_vec(),
                        }),
                        _ => None,
                    };
                    self.reader.consume(offset);
                    if let Some(p) = packet {
                        return Some(Ok(p));
                    }
                }
                Err(PcapError::Eof) => {
                    self.done = true;
                    return None;
                }
                Err(PcapError::Incomplete(_)) if !refilled => {
                    refilled = true;
                    if self.reader.refill().is_err() {
                        self.done = true;
                        return None;
                    }
                }
                Err(PcapError::Incomplete(_)) => {
                    // truncated final record
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(anyhow!("pcap read error: {:?}", e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_resolution() {
        assert_eq!(timestamp_us(false, 2, 500), 2_000_500);
        assert_eq!(timestamp_us(true, 2, 500_000), 2_000_500);
    }

    #[test]
    fn test_missing_file() {
        assert!(PcapReader::new("/nonexistent/file.pcap").is_err());
    }
}
