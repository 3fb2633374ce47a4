//! CH55x USB bootloader protocol implementation.

pub mod constants;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod protocol;
pub mod state;
pub mod transport;

pub use self::device::Chip;
pub use self::error::{Error, Operation, Result};
pub use self::flashing::{FlashOptions, Flashing, Region};
pub use self::protocol::{BootloaderVersion, Command, Response};
pub use self::state::SessionState;
pub use self::transport::Transport;
