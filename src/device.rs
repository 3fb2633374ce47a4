//! MCU Chip definition
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Represents an MCU chip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chip {
    pub name: String,
    #[serde(deserialize_with = "parse_address_and_offset_u8")]
    pub chip_id: u8,
    #[serde(deserialize_with = "parse_address_and_offset_u8")]
    pub chip_type: u8,

    #[serde(deserialize_with = "parse_address_and_offset_u16")]
    pub vendor_id: u16,
    #[serde(deserialize_with = "parse_address_and_offset_u16")]
    pub product_id: u16,

    #[serde(deserialize_with = "parse_address_and_offset")]
    pub flash_size: u32,
    #[serde(default, deserialize_with = "parse_address_and_offset")]
    pub eeprom_size: u32,
    #[serde(default, deserialize_with = "parse_address_and_offset")]
    pub eeprom_start_addr: u32,

    /// Number of 1KiB blocks a full code erase covers.
    pub erase_blocks: u8,

    #[serde(default)]
    pub description: String,
}

impl ::std::fmt::Display for Chip {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(f, "{}(0x{:02x}{:02x})", self.name, self.chip_id, self.chip_type)
    }
}

impl Chip {
    pub fn ch559() -> Result<Self> {
        Self::from_yaml(include_str!("../devices/CH559.yaml"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Chip(e.to_string()))
    }

    /// Data flash erase count, in 1KiB blocks.
    pub fn data_erase_blocks(&self) -> u8 {
        self.eeprom_size.div_ceil(1024).max(1) as u8
    }
}

fn parse_number(s: &str) -> std::result::Result<u32, String> {
    let err = |_: std::num::ParseIntError| format!("error while parsing {:?}", s);
    if s.starts_with("0x") || s.starts_with("0X") {
        u32::from_str_radix(&s[2..], 16).map_err(err)
    } else if let Some(n) = s.strip_suffix("KiB") {
        n.parse::<u32>().map(|n| n * 1024).map_err(err)
    } else if let Some(n) = s.strip_suffix("KB") {
        n.parse::<u32>().map(|n| n * 1024).map_err(err)
    } else if let Some(n) = s.strip_suffix('K') {
        n.parse::<u32>().map(|n| n * 1024).map_err(err)
    } else {
        s.parse().map_err(err)
    }
}

fn parse_address_and_offset<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    parse_number(&s).map_err(serde::de::Error::custom)
}

fn parse_address_and_offset_u16<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = parse_address_and_offset(deserializer)?;
    u16::try_from(n).map_err(serde::de::Error::custom)
}

fn parse_address_and_offset_u8<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = parse_address_and_offset(deserializer)?;
    u8::try_from(n).map_err(serde::de::Error::custom)
}
