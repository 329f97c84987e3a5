//! SMB1 header status: either a DOS error class/code pair or a 32-bit
//! NTSTATUS, selected by the `FLAGS2_NT_STATUS` bit.
//!
//! The top 2 bits of an NTSTATUS encode severity:
//! - 00 = Success
//! - 01 = Informational
//! - 10 = Warning
//! - 11 = Error

use serde::Serialize;
use std::fmt;

/// A raw NTSTATUS code with the names that show up in SMB1 traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NtStatus(pub u32);

impl NtStatus {
    const SEVERITY_MASK: u32 = 0xC000_0000;

    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const PENDING: Self = Self(0x0000_0103);
    pub const BUFFER_OVERFLOW: Self = Self(0x8000_0005);
    pub const MORE_PROCESSING_REQUIRED: Self = Self(0xC000_0016);
    pub const ACCESS_DENIED: Self = Self(0xC000_0022);
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xC000_0034);
    pub const CANCELLED: Self = Self(0xC000_0120);

    pub fn is_success(self) -> bool {
        (self.0 & Self::SEVERITY_MASK) == 0x0000_0000
    }

    pub fn is_warning(self) -> bool {
        (self.0 & Self::SEVERITY_MASK) == 0x8000_0000
    }

    pub fn is_error(self) -> bool {
        (self.0 & Self::SEVERITY_MASK) == 0xC000_0000
    }

    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            0x0000_0000 => Some("STATUS_SUCCESS"),
            0x0000_0103 => Some("STATUS_PENDING"),
            0x0000_010B => Some("STATUS_NOTIFY_CLEANUP"),
            0x0000_010C => Some("STATUS_NOTIFY_ENUM_DIR"),
            0x8000_0005 => Some("STATUS_BUFFER_OVERFLOW"),
            0x8000_0006 => Some("STATUS_NO_MORE_FILES"),
            0xC000_0001 => Some("STATUS_UNSUCCESSFUL"),
            0xC000_0002 => Some("STATUS_NOT_IMPLEMENTED"),
            0xC000_0008 => Some("STATUS_INVALID_HANDLE"),
            0xC000_000D => Some("STATUS_INVALID_PARAMETER"),
            0xC000_000F => Some("STATUS_NO_SUCH_FILE"),
            0xC000_0010 => Some("STATUS_INVALID_DEVICE_REQUEST"),
            0xC000_0011 => Some("STATUS_END_OF_FILE"),
            0xC000_0016 => Some("STATUS_MORE_PROCESSING_REQUIRED"),
            0xC000_0022 => Some("STATUS_ACCESS_DENIED"),
            0xC000_0023 => Some("STATUS_BUFFER_TOO_SMALL"),
            0xC000_0033 => Some("STATUS_OBJECT_NAME_INVALID"),
            0xC000_0034 => Some("STATUS_OBJECT_NAME_NOT_FOUND"),
            0xC000_0035 => Some("STATUS_OBJECT_NAME_COLLISION"),
            0xC000_003A => Some("STATUS_OBJECT_PATH_NOT_FOUND"),
            0xC000_0043 => Some("STATUS_SHARING_VIOLATION"),
            0xC000_0054 => Some("STATUS_FILE_LOCK_CONFLICT"),
            0xC000_0055 => Some("STATUS_LOCK_NOT_GRANTED"),
            0xC000_006D => Some("STATUS_LOGON_FAILURE"),
            0xC000_00BA => Some("STATUS_FILE_IS_A_DIRECTORY"),
            0xC000_00BB => Some("STATUS_NOT_SUPPORTED"),
            0xC000_00CC => Some("STATUS_BAD_NETWORK_NAME"),
            0xC000_00D4 => Some("STATUS_NETWORK_NAME_DELETED"),
            0xC000_0120 => Some("STATUS_CANCELLED"),
            0xC000_0128 => Some("STATUS_FILE_CLOSED"),
            0xC000_014B => Some("STATUS_PIPE_BROKEN"),
            0xC000_0203 => Some("STATUS_USER_SESSION_DELETED"),
            0xC000_0205 => Some("STATUS_INSUFF_SERVER_RESOURCES"),
            _ => None,
        }
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{} (0x{:08X})", name, self.0)
        } else {
            let severity = match self.0 & Self::SEVERITY_MASK {
                0x0000_0000 => "Success",
                0x4000_0000 => "Info",
                0x8000_0000 => "Warning",
                _ => "Error",
            };
            write!(f, "NTSTATUS_{}(0x{:08X})", severity, self.0)
        }
    }
}

/// DOS error classes [MS-CIFS 2.2.2.4].
pub const ERRDOS: u8 = 0x01;
pub const ERRSRV: u8 = 0x02;
pub const ERRHRD: u8 = 0x03;
pub const ERRCMD: u8 = 0xFF;

fn dos_class_name(class: u8) -> Option<&'static str> {
    match class {
        0x00 => Some("SUCCESS"),
        ERRDOS => Some("ERRDOS"),
        ERRSRV => Some("ERRSRV"),
        ERRHRD => Some("ERRHRD"),
        ERRCMD => Some("ERRCMD"),
        _ => None,
    }
}

/// Header status as it appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format")]
pub enum Status {
    Dos { class: u8, code: u16 },
    Nt { code: NtStatus },
}

impl Status {
    /// Interpret the 4 status bytes of the header. `nt` is the
    /// `FLAGS2_NT_STATUS` bit.
    pub fn from_raw(raw: [u8; 4], nt: bool) -> Self {
        if nt {
            Status::Nt {
                code: NtStatus(u32::from_le_bytes(raw)),
            }
        } else {
            // class, reserved, code (le)
            Status::Dos {
                class: raw[0],
                code: u16::from_le_bytes([raw[2], raw[3]]),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Status::Dos { class, code } => *class == 0 && *code == 0,
            Status::Nt { code } => code.is_success(),
        }
    }

    /// `STATUS_BUFFER_OVERFLOW` / `ERRDOS:ERRmoredata`: the response is
    /// partial and more follows.
    pub fn is_more_data(&self) -> bool {
        match self {
            Status::Dos { class, code } => *class == ERRDOS && *code == 234,
            Status::Nt { code } => *code == NtStatus::BUFFER_OVERFLOW,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Nt { code } => code.fmt(f),
            Status::Dos { class, code } => match dos_class_name(*class) {
                Some(name) => write!(f, "{}:{}", name, code),
                None => write!(f, "DOS(0x{:02X}):{}", class, code),
            },
        }
    }
}
