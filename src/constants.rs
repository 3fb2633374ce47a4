/// Maximum payload bytes carried by one range frame.
pub const MAX_PAYLOAD_SIZE: usize = 0x38;

/// Offset of the payload within a range frame.
pub const RANGE_HEADER_SIZE: usize = 8;

/// Data flash is addressed as an offset from this base.
pub const DATA_FLASH_BASE: u16 = 0xf000;

/// Offset of the result code in every response.
pub const RESULT_OFFSET: usize = 4;

/// Offset of the payload in a data read response.
pub const READ_PAYLOAD_OFFSET: usize = 6;

/// Magic string carried by the detect frame.
pub const DETECT_MAGIC: &[u8; 16] = b"MCU ISP & WCH.CN";

/// Bootkey seed length, the key frame is this plus a 3 byte header.
pub const BOOTKEY_SEED_SIZE: usize = 0x30;

pub mod commands {
    pub const DETECT: u8 = 0xa1;
    pub const BOOT: u8 = 0xa2;
    pub const BOOTKEY: u8 = 0xa3;
    pub const ERASE: u8 = 0xa4;
    pub const PROGRAM: u8 = 0xa5;
    pub const VERIFY: u8 = 0xa6;
    pub const IDENTIFY: u8 = 0xa7;
    pub const WRITE_CONFIG: u8 = 0xa8;
    pub const DATA_ERASE: u8 = 0xa9;
    pub const DATA_PROGRAM: u8 = 0xaa;
    pub const DATA_READ: u8 = 0xab;
}

/// Response sizes the bootloader replies with.
pub mod response_size {
    pub const STATUS: usize = 6;
    pub const IDENTIFY: usize = 30;
    pub const NONE: usize = 0;
}
