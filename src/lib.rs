//! Passive SMB1/CIFS interpreter.
//!
//! Decodes SMB1 PDUs, walks AndX chains, correlates requests with their
//! responses and continuations per conversation, and reassembles
//! multi-PDU transactions into payloads for external interpreters.
//!
//! ```text
//! protocol  (cursor, header, status, commands)
//!   → dissect  (per-command decoders, registry, AndX walker)
//!   → engine   (conversations, correlation, reassembly, hand-offs)
//! capture (feature "pcap"): pcap → TCP → session framing → engine
//! ```

pub mod config;
pub mod dissect;
pub mod engine;
pub mod error;
pub mod observability;
pub mod protocol;

#[cfg(feature = "pcap")]
pub mod capture;

pub use config::EngineConfig;
pub use engine::{Direction, Dissector, FrameId, FrameInfo, Pass, PduOutcome};
pub use error::{DissectError, MalformedReason};
