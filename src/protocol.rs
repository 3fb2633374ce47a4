//! The underlying binary protocol of the CH55x USB bootloader

use std::fmt;

use scroll::Pwrite;

use crate::constants::{
    BOOTKEY_SEED_SIZE, DETECT_MAGIC, MAX_PAYLOAD_SIZE, RANGE_HEADER_SIZE, READ_PAYLOAD_OFFSET,
    RESULT_OFFSET, commands, response_size,
};
use crate::error::{Error, Operation, Result};

/// ISP Command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Look for the bootloader. The device echoes its chip id at offset 4.
    Detect { chip_id: u8, chip_type: u8 },
    /// Query the config area. Carries the bootloader version and the key seed bytes.
    Identify,
    /// Unlock the session. The frame is filled with the identify checksum.
    ///
    /// Acknowledged with the chip id at offset 4.
    Bootkey { seed: u8 },
    /// Erase the Code Flash, in 1KiB blocks.
    Erase { blocks: u8 },
    /// Erase the Data Flash, in 1KiB blocks.
    EraseData { blocks: u8 },
    /// Program the Code Flash.
    ///
    /// `data` is mixed with `key` (the chip id) on every 8th byte.
    Program { address: u16, key: u8, data: Vec<u8> },
    /// Verify the Code Flash, same layout as `Program`
    Verify { address: u16, key: u8, data: Vec<u8> },
    /// Program the Data Flash, same layout as `Program`
    DataProgram { address: u16, key: u8, data: Vec<u8> },
    /// Read the Data Flash
    DataRead { address: u16, len: u8 },
    /// Leave the bootloader and run the application.
    ///
    /// The device does not answer.
    Boot,
    /// Rewrite the config high byte. Layout depends on the bootloader version.
    WriteConfig { version: BootloaderVersion, high: u8 },
}

impl Command {
    pub fn detect(chip_id: u8, chip_type: u8) -> Self {
        Command::Detect { chip_id, chip_type }
    }

    pub fn erase(blocks: u8) -> Self {
        Command::Erase { blocks }
    }

    pub fn data_read(address: u16, len: u8) -> Self {
        Command::DataRead { address, len }
    }

    pub fn write_config(version: BootloaderVersion, high: u8) -> Self {
        Command::WriteConfig { version, high }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::Detect { .. } => Operation::Detect,
            Command::Identify => Operation::Identify,
            Command::Bootkey { .. } => Operation::Bootkey,
            Command::Erase { .. } => Operation::Erase,
            Command::EraseData { .. } => Operation::EraseData,
            Command::Program { .. } => Operation::Write,
            Command::Verify { .. } => Operation::Verify,
            Command::DataProgram { .. } => Operation::WriteData,
            Command::DataRead { .. } => Operation::ReadData,
            Command::Boot => Operation::Boot,
            Command::WriteConfig { .. } => Operation::WriteConfig,
        }
    }

    /// Number of bytes the device answers with.
    pub fn response_size(&self) -> usize {
        match self {
            Command::Identify => response_size::IDENTIFY,
            Command::DataRead { len, .. } => READ_PAYLOAD_OFFSET + *len as usize,
            Command::Boot => response_size::NONE,
            _ => response_size::STATUS,
        }
    }

    pub fn into_raw(self) -> Result<Vec<u8>> {
        match self {
            Command::Detect { chip_id, chip_type } => {
                let mut buf = Vec::with_capacity(0x12 + 3);
                buf.push(commands::DETECT);
                buf.extend_from_slice(&[0x12, 0]);
                buf.push(chip_id);
                buf.push(chip_type);
                buf.extend_from_slice(DETECT_MAGIC);
                Ok(buf)
            }
            Command::Identify => Ok([commands::IDENTIFY, 0x02, 0x00, 0x1f, 0x00].to_vec()),
            Command::Bootkey { seed } => {
                let mut buf = Vec::with_capacity(3 + BOOTKEY_SEED_SIZE);
                buf.push(commands::BOOTKEY);
                buf.push(BOOTKEY_SEED_SIZE as u8);
                buf.push(0x00);
                buf.resize(3 + BOOTKEY_SEED_SIZE, seed);
                Ok(buf)
            }
            Command::Erase { blocks } => Ok([commands::ERASE, 0x01, 0x00, blocks].to_vec()),
            Command::EraseData { blocks } => Ok([commands::DATA_ERASE, 0x01, 0x00, blocks].to_vec()),
            Command::Program { address, key, data } => {
                build_range_frame(commands::PROGRAM, address, &data, key)
            }
            Command::Verify { address, key, data } => {
                build_range_frame(commands::VERIFY, address, &data, key)
            }
            Command::DataProgram { address, key, data } => {
                build_range_frame(commands::DATA_PROGRAM, address, &data, key)
            }
            Command::DataRead { address, len } => {
                if len as usize > MAX_PAYLOAD_SIZE {
                    return Err(Error::InvalidLength {
                        len: len as usize,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                let mut buf = vec![0u8; RANGE_HEADER_SIZE];
                buf[0] = commands::DATA_READ;
                buf[1] = 5;
                write_address(&mut buf, address);
                buf[7] = len;
                Ok(buf)
            }
            Command::Boot => Ok([commands::BOOT, 0x01, 0x00, 0x01].to_vec()),
            Command::WriteConfig { version, high } => {
                let template = config_template(version)
                    .ok_or(Error::UnsupportedBootloaderVersion(version))?;
                let mut buf = template.to_vec();
                buf[CONFIG_HIGH_BYTE_OFFSET] = high;
                Ok(buf)
            }
        }
    }
}

fn write_address(buf: &mut [u8], address: u16) {
    // offsets 3..5 always exist in a frame header
    let _ = buf.pwrite_with::<u16>(address, 3, scroll::LE);
}

/// Build a code/data range frame.
///
/// The payload is padded with 0xff to a multiple of 8 and every 8th payload
/// byte is XORed with `key`.
pub fn build_range_frame(opcode: u8, address: u16, payload: &[u8], key: u8) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::InvalidLength {
            len: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let padded = padded_len(payload.len());

    let mut buf = vec![0xffu8; RANGE_HEADER_SIZE + padded];
    buf[0] = opcode;
    buf[1] = (padded + 5) as u8;
    buf[2] = 0x00;
    write_address(&mut buf, address);
    buf[5] = 0x00;
    buf[6] = 0x00;
    buf[7] = payload.len() as u8;
    buf[RANGE_HEADER_SIZE..RANGE_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    mix_key(&mut buf[RANGE_HEADER_SIZE..], key);
    Ok(buf)
}

/// XOR `key` into every payload byte at index 7 mod 8. Applying it twice restores the input.
pub fn mix_key(payload: &mut [u8], key: u8) {
    for b in payload.iter_mut().skip(7).step_by(8) {
        *b ^= key;
    }
}

pub fn padded_len(len: usize) -> usize {
    len.div_ceil(8) * 8
}

/// Bootloader version reported by the identify command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BootloaderVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl BootloaderVersion {
    pub const V2_31: BootloaderVersion = BootloaderVersion::new(2, 3, 1);
    pub const V2_40: BootloaderVersion = BootloaderVersion::new(2, 4, 0);

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        BootloaderVersion {
            major,
            minor,
            patch,
        }
    }

    /// Only 2.3x and 2.4x bootloaders speak this protocol.
    pub fn is_known(&self) -> bool {
        self.major == 2 && matches!(self.minor, 3 | 4)
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.major, self.minor, self.patch)
    }
}

const VERSION_OFFSET: usize = 19;
const KEY_SEED_OFFSET: usize = 22;

const CONFIG_HIGH_BYTE_OFFSET: usize = 14;

/// Config write frames per bootloader version. The high byte at offset 14 is a placeholder.
const CONFIG_TEMPLATES: &[(BootloaderVersion, [u8; 17])] = &[
    (
        BootloaderVersion::V2_31,
        [
            0xa8, 0x0e, 0x00, 0x07, 0x00, 0xff, 0xff, 0xff, 0xff, 0x03, 0x00, 0x00, 0x00, 0xff,
            0x00, 0x00, 0x00,
        ],
    ),
    (
        BootloaderVersion::V2_40,
        [
            0xa8, 0x0e, 0x00, 0x07, 0x00, 0xff, 0xff, 0xff, 0xff, 0x23, 0x00, 0x00, 0x00, 0xf6,
            0x00, 0xff, 0x97,
        ],
    ),
];

fn config_template(version: BootloaderVersion) -> Option<&'static [u8; 17]> {
    CONFIG_TEMPLATES
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, t)| t)
}

/// Raw response to a Command, sized by the issuing command.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Response(Vec<u8>);

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get(RESULT_OFFSET) {
            Some(0) => write!(f, "OK[{}]", hex::encode(&self.0)),
            Some(code) => write!(f, "RESULT({:x})[{}]", code, hex::encode(&self.0)),
            None => write!(f, "[{}]", hex::encode(&self.0)),
        }
    }
}

impl Response {
    pub fn new(raw: Vec<u8>) -> Self {
        Response(raw)
    }

    pub fn raw(&self) -> &[u8] {
        &self.0
    }

    /// Result or echo byte at offset 4. Missing bytes read as 0xff.
    pub fn result_code(&self) -> u8 {
        self.0.get(RESULT_OFFSET).copied().unwrap_or(0xff)
    }

    pub fn is_ok(&self) -> bool {
        self.result_code() == 0
    }

    /// Data read payload of `len` bytes.
    pub fn read_payload(&self, len: usize) -> &[u8] {
        let start = READ_PAYLOAD_OFFSET.min(self.0.len());
        let end = (READ_PAYLOAD_OFFSET + len).min(self.0.len());
        &self.0[start..end]
    }

    /// Version triple at offsets 19..22 of the identify response.
    pub fn version(&self) -> Result<BootloaderVersion> {
        let raw = self
            .0
            .get(VERSION_OFFSET..VERSION_OFFSET + 3)
            .ok_or(Error::IdentifyFailed)?;
        let version = BootloaderVersion::new(raw[0], raw[1], raw[2]);
        if !version.is_known() {
            return Err(Error::UnknownBootloader(version));
        }
        Ok(version)
    }

    /// Sum of the four seed bytes at offsets 22..26, truncated to a byte.
    pub fn identify_checksum(&self) -> Result<u8> {
        let seed = self
            .0
            .get(KEY_SEED_OFFSET..KEY_SEED_OFFSET + 4)
            .ok_or(Error::IdentifyFailed)?;
        Ok(seed.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)))
    }
}
