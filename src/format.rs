//! Firmware file formats
use std::str;
use std::{borrow::Cow, path::Path};

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    PlainHex,
    IntelHex,
    Binary,
}

/// Load an image to be programmed at code flash address 0.
pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        FirmwareFormat::PlainHex => read_hex(str::from_utf8(&raw)?),
        FirmwareFormat::IntelHex => read_ihex(str::from_utf8(&raw)?),
        FirmwareFormat::Binary => Ok(raw),
    }
}

pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    if ["ihex", "ihx", "ihe", "h86", "hex", "a43", "a90"].contains(&&*ext) {
        return FirmwareFormat::IntelHex;
    }
    if raw.is_empty() {
        return FirmwareFormat::Binary;
    }

    if raw[0] == b':'
        && raw
            .iter()
            .all(|&c| c.is_ascii_hexdigit() || c == b':' || c == b'\n' || c == b'\r')
    {
        FirmwareFormat::IntelHex
    } else if raw
        .iter()
        .all(|&c| c.is_ascii_hexdigit() || c == b'\n' || c == b'\r')
    {
        FirmwareFormat::PlainHex
    } else {
        FirmwareFormat::Binary
    }
}

pub fn read_hex(data: &str) -> Result<Vec<u8>> {
    let digits: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base_address = 0;

    let mut records = vec![];
    for record in ihex::Reader::new(data) {
        let record = record?;
        use Record::*;
        match record {
            Data { offset, value } => {
                let offset = base_address + offset as u32;

                records.push((offset, value.into()));
            }
            EndOfFile => (),
            ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            StartSegmentAddress { .. } => (),
            ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            StartLinearAddress(_) => (),
        };
    }
    merge_sections(records)
}

/// Lay sections out from address 0, gaps are left erased (0xff).
fn merge_sections(mut sections: Vec<(u32, Cow<[u8]>)>) -> Result<Vec<u8>> {
    if sections.is_empty() {
        anyhow::bail!("empty firmware image");
    }
    sections.sort(); // order by start address

    let end_address = sections
        .iter()
        .map(|(addr, sect)| addr + sect.len() as u32)
        .max()
        .unwrap_or(0);

    let mut binary = vec![0xffu8; end_address as usize];
    let mut cursor = 0usize;
    for (addr, sect) in sections {
        let sect_start = addr as usize;
        let sect_end = sect_start + sect.len();
        anyhow::ensure!(
            sect_start >= cursor,
            "overlapping sections at 0x{:04x}",
            sect_start
        );
        binary[sect_start..sect_end].copy_from_slice(&sect);
        cursor = sect_end;
    }
    Ok(binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses() {
        assert_eq!(
            guess_format(Path::new("fw.ihx"), b":00000001FF\n"),
            FirmwareFormat::IntelHex
        );
        assert_eq!(
            guess_format(Path::new("fw.txt"), b":00000001FF\r\n"),
            FirmwareFormat::IntelHex
        );
        assert_eq!(
            guess_format(Path::new("fw.txt"), b"0102ff\n"),
            FirmwareFormat::PlainHex
        );
        assert_eq!(
            guess_format(Path::new("fw.bin"), &[0x02, 0x00, 0x10, 0xfe]),
            FirmwareFormat::Binary
        );
    }

    #[test]
    fn plain_hex_ignores_line_breaks() {
        assert_eq!(read_hex("0102\r\n03ff\n").unwrap(), vec![1, 2, 3, 0xff]);
    }

    #[test]
    fn ihex_is_anchored_at_zero() {
        let ihex = ":0300020002001FDA\n:00000001FF\n";
        let image = read_ihex(ihex).unwrap();
        assert_eq!(image, vec![0xff, 0xff, 0x02, 0x00, 0x1f]);
    }

    #[test]
    fn empty_ihex_is_rejected() {
        assert!(read_ihex(":00000001FF\n").is_err());
    }
}
