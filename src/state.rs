//! Connection lifecycle of an ISP session.

use std::fmt;

use crate::error::{Error, Operation, Result};
use crate::protocol::{BootloaderVersion, Response};

/// Why a connection attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    ClaimFailed,
    DetectFailed,
    IdentifyFailed,
    UnknownBootloader,
    BootkeyError,
    /// The transport failed during the given command.
    Transport(Operation),
    /// Any other error raised while connecting.
    Other,
}

impl From<&Error> for FailReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::ClaimFailed(_) => FailReason::ClaimFailed,
            Error::DetectFailed { .. } => FailReason::DetectFailed,
            Error::IdentifyFailed => FailReason::IdentifyFailed,
            Error::UnknownBootloader(_) => FailReason::UnknownBootloader,
            Error::BootkeyError { .. } => FailReason::BootkeyError,
            Error::Request { op, .. }
            | Error::Response { op, .. }
            | Error::ShortResponse { op, .. } => FailReason::Transport(*op),
            _ => FailReason::Other,
        }
    }
}

/// Session state. Only `Initialized` accepts flash operations.
///
/// Transitions only move forward, `Failed` ends the connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Detected {
        chip_id: u8,
    },
    Identified {
        chip_id: u8,
        version: BootloaderVersion,
        key_seed: u8,
    },
    Initialized {
        chip_id: u8,
        version: BootloaderVersion,
    },
    Failed(FailReason),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Detected { chip_id } => write!(f, "detected(0x{:02x})", chip_id),
            SessionState::Identified { version, .. } => write!(f, "identified({})", version),
            SessionState::Initialized { version, .. } => write!(f, "initialized({})", version),
            SessionState::Failed(reason) => write!(f, "failed({:?})", reason),
        }
    }
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Initialized { .. })
    }

    pub fn chip_id(&self) -> Option<u8> {
        match *self {
            SessionState::Detected { chip_id }
            | SessionState::Identified { chip_id, .. }
            | SessionState::Initialized { chip_id, .. } => Some(chip_id),
            _ => None,
        }
    }

    pub fn bootloader_version(&self) -> Option<BootloaderVersion> {
        match *self {
            SessionState::Identified { version, .. } | SessionState::Initialized { version, .. } => {
                Some(version)
            }
            _ => None,
        }
    }

    fn unexpected(&self, op: Operation) -> Error {
        Error::NotReady { op, state: *self }
    }

    /// Disconnected -> Detected. The device must echo `expected_chip_id` at offset 4.
    pub fn on_detect(&self, expected_chip_id: u8, resp: &Response) -> Result<SessionState> {
        if *self != SessionState::Disconnected {
            return Err(self.unexpected(Operation::Detect));
        }
        let code = resp.result_code();
        if code != expected_chip_id {
            return Err(Error::DetectFailed { code });
        }
        Ok(SessionState::Detected { chip_id: code })
    }

    /// Detected -> Identified. Validates the version and derives the bootkey seed.
    pub fn on_identify(&self, resp: &Response) -> Result<SessionState> {
        let SessionState::Detected { chip_id } = *self else {
            return Err(self.unexpected(Operation::Identify));
        };
        let version = resp.version()?;
        let key_seed = resp.identify_checksum()?;
        Ok(SessionState::Identified {
            chip_id,
            version,
            key_seed,
        })
    }

    /// Identified -> Initialized. The device acknowledges the key with the chip id.
    pub fn on_bootkey(&self, resp: &Response) -> Result<SessionState> {
        let SessionState::Identified {
            chip_id, version, ..
        } = *self
        else {
            return Err(self.unexpected(Operation::Bootkey));
        };
        let actual = resp.result_code();
        if actual != chip_id {
            return Err(Error::BootkeyError {
                expected: chip_id,
                actual,
            });
        }
        Ok(SessionState::Initialized { chip_id, version })
    }

    /// Gate for flash operations.
    pub fn require_ready(&self, op: Operation) -> Result<(u8, BootloaderVersion)> {
        match *self {
            SessionState::Initialized { chip_id, version } => Ok((chip_id, version)),
            _ => Err(self.unexpected(op)),
        }
    }
}
