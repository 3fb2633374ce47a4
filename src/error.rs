//! Error types of the ISP session.

use std::fmt;

use thiserror::Error;

use crate::protocol::BootloaderVersion;
use crate::state::SessionState;
use crate::transport::TransportError;

/// The command a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Detect,
    Identify,
    Bootkey,
    Erase,
    EraseData,
    Write,
    Verify,
    WriteData,
    ReadData,
    Boot,
    WriteConfig,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Detect => "detect",
            Operation::Identify => "identify",
            Operation::Bootkey => "bootkey",
            Operation::Erase => "erase",
            Operation::EraseData => "eraseData",
            Operation::Write => "write",
            Operation::Verify => "verify",
            Operation::WriteData => "writeData",
            Operation::ReadData => "readData",
            Operation::Boot => "boot",
            Operation::WriteConfig => "writeConfig",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{op}: request failed: {source}")]
    Request {
        op: Operation,
        #[source]
        source: TransportError,
    },

    #[error("{op}: response failed: {source}")]
    Response {
        op: Operation,
        #[source]
        source: TransportError,
    },

    #[error("{op}: short response, expected {expected} bytes, got {actual}")]
    ShortResponse {
        op: Operation,
        expected: usize,
        actual: usize,
    },

    #[error("detect failed, device answered 0x{code:02x}")]
    DetectFailed { code: u8 },

    #[error("identify failed")]
    IdentifyFailed,

    #[error("unknown bootloader {0}")]
    UnknownBootloader(BootloaderVersion),

    #[error("bootkey rejected, expected 0x{expected:02x}, got 0x{actual:02x}")]
    BootkeyError { expected: u8, actual: u8 },

    #[error("failed to claim the bootloader interface: {0}")]
    ClaimFailed(#[source] TransportError),

    #[error("payload of {len} bytes exceeds the {max} byte frame capacity")]
    InvalidLength { len: usize, max: usize },

    #[error("image of {size} bytes does not fit in {max} bytes of flash")]
    FirmwareTooLarge { size: usize, max: usize },

    #[error("{op} failed at 0x{address:04x} with result 0x{code:02x}")]
    OperationFailed { op: Operation, address: u16, code: u8 },

    #[error("erase failed with result 0x{code:02x}")]
    EraseError { code: u8 },

    #[error("data flash erase failed with result 0x{code:02x}")]
    EraseDataError { code: u8 },

    #[error("data flash read at 0x{address:04x} failed with result 0x{code:02x}")]
    ReadDataFailed { address: u16, code: u8 },

    #[error("data flash content differs at 0x{address:04x}")]
    VerifyMismatch { address: u16 },

    #[error("config write is not supported on bootloader {0}")]
    UnsupportedBootloaderVersion(BootloaderVersion),

    #[error("config write failed with result 0x{code:02x}")]
    WriteConfigFailed { code: u8 },

    #[error("{op}: session is not ready ({state})")]
    NotReady { op: Operation, state: SessionState },

    #[error("chip description: {0}")]
    Chip(String),
}

pub type Result<T> = std::result::Result<T, Error>;
