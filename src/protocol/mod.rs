//! SMB1 wire primitives: bounds-checked reads, the fixed header, status
//! codes and the command table.
//!
//! ## References
//!
//! - [MS-CIFS] Common Internet File System (CIFS) Protocol
//! - [MS-SMB] Server Message Block (SMB) Protocol
//! - [MS-ERREF] Windows Error Codes

pub mod commands;
pub mod cursor;
pub mod header;
pub mod status;

pub use cursor::ByteCursor;
pub use header::{decode_header, Header};
pub use status::{NtStatus, Status};
