//! Command block decoding.
//!
//! ```text
//! PDU bytes (after the 32-byte header)
//!   → CommandRegistry::dispatch(opcode, is_request)
//!   → DecodeFn → DecodedBlock (framing, AndX link, detail)
//!   → walk_chain follows AndX links to the next block
//! ```

pub mod andx;
pub mod records;
pub mod registry;

pub use andx::{walk_chain, Chain};
pub use records::{BlockDetail, DecodedBlock, TransFragment};
pub use registry::{CommandRegistry, DecodeFn};
