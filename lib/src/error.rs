// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::io;

/// A non-zero status word returned by the switch firmware for an MRPC
/// command. The value is carried as-is; `Display` only adds a name for the
/// codes the firmware documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnCode(pub u32);

impl ReturnCode {
    pub const NO_AVAILABLE_MRPC_THREAD: u32 = 0x64001;
    pub const MRPC_THREAD_NOT_IDLE: u32 = 0x64002;
    pub const NO_BG_THREAD: u32 = 0x64003;
    pub const INVALID_SUBCMD: u32 = 0x64004;
    pub const INVALID_CMD: u32 = 0x64005;
    pub const INVALID_PARAM: u32 = 0x64006;
    pub const BAD_FW_STATE: u32 = 0x64007;
    pub const STACK_INVALID: u32 = 0x100001;
    pub const PORT_INVALID: u32 = 0x100002;
    pub const EVENT_INVALID: u32 = 0x100003;
    pub const RST_RULE_FAILED: u32 = 0x100005;
    pub const ACCESS_REFUSED: u32 = 0xFFFF0001;

    pub fn message(&self) -> Option<&'static str> {
        Some(match self.0 {
            Self::NO_AVAILABLE_MRPC_THREAD => "No available MRPC handler thread",
            Self::MRPC_THREAD_NOT_IDLE => "The handler thread is not idle",
            Self::NO_BG_THREAD => "No background thread run for the command",
            Self::INVALID_SUBCMD => "Invalid subcommand",
            Self::INVALID_CMD => "Invalid command",
            Self::INVALID_PARAM => "Invalid parameter",
            Self::BAD_FW_STATE => "Bad firmware state",
            Self::STACK_INVALID => "Invalid Stack",
            Self::PORT_INVALID => "Invalid Port",
            Self::EVENT_INVALID => "Invalid Event",
            Self::RST_RULE_FAILED => "Reset rule search failed",
            Self::ACCESS_REFUSED => "Access Refused",
            _ => return None,
        })
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} (0x{:x})", msg, self.0),
            None => write!(f, "unknown firmware error 0x{:x}", self.0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("counter range {counter}..{end} exceeds {max} event counters")]
    CounterOutOfRange { counter: usize, end: usize, max: usize },

    #[error("reply of {0} bytes exceeds the MRPC data limit")]
    ResponseTooLarge(usize),

    #[error("request of {0} bytes exceeds the MRPC data limit")]
    RequestTooLarge(usize),

    #[error("port {0} out of range")]
    PortOutOfRange(usize),

    #[error("stack {0} out of range")]
    StackOutOfRange(usize),

    #[error("index {index} is not valid for event {event}")]
    InvalidEventIndex { event: &'static str, index: i32 },

    #[error("partition {0} out of range")]
    PartitionOutOfRange(usize),

    #[error("{what} {value} out of range (max {max})")]
    ValueOutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid access width {0}; must be 1, 2, 4 or 8 bytes")]
    InvalidWidth(usize),

    #[error("address {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("Out of range for Global Address Space")]
    GasOutOfRange { addr: usize, len: usize },

    #[error("firmware returned error: {0}")]
    Mrpc(ReturnCode),

    #[error("short MRPC transfer: {done} of {expected} bytes")]
    ShortTransfer { done: usize, expected: usize },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to map global address space: {0}")]
    Map(io::Error),

    #[error("no such switchtec device: {0}")]
    DeviceNotFound(String),

    #[error("{0} is not a switchtec device")]
    NotSwitchtec(String),

    #[error("{0} is not supported on this device or platform")]
    Unsupported(&'static str),
}

impl Error {
    /// The firmware status word, when the error came from the switch.
    pub fn return_code(&self) -> Option<u32> {
        match self {
            Error::Mrpc(rc) => Some(rc.0),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_are_named() {
        let rc = ReturnCode(ReturnCode::PORT_INVALID);
        assert_eq!(rc.message(), Some("Invalid Port"));
        assert_eq!(rc.to_string(), "Invalid Port (0x100002)");
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        let e = Error::Mrpc(ReturnCode(0x1234));
        assert_eq!(e.return_code(), Some(0x1234));
        assert!(e.to_string().contains("0x1234"));
    }
}
