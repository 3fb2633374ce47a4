//! Chip flashing logic.

use std::time::Duration;

use crate::constants::{DATA_FLASH_BASE, MAX_PAYLOAD_SIZE};
use crate::error::{Error, Operation, Result};
use crate::protocol::{BootloaderVersion, Command, Response};
use crate::state::{FailReason, SessionState};
use crate::transport::{DEFAULT_TIMEOUT, Transport, UsbTransport};
use crate::Chip;

/// Result code some 2.3x bootloaders return for a final block shorter than a full frame.
const LEGACY_SHORT_BLOCK_ACK: u8 = 0xfe;

/// Which flash a range operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Code,
    /// Addressed as an offset from [`DATA_FLASH_BASE`].
    Data,
}

/// The range commands sharing the `Program` frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOp {
    Write,
    Verify,
    WriteData,
}

impl RangeOp {
    fn operation(self) -> Operation {
        match self {
            RangeOp::Write => Operation::Write,
            RangeOp::Verify => Operation::Verify,
            RangeOp::WriteData => Operation::WriteData,
        }
    }

    fn command(self, address: u16, key: u8, data: Vec<u8>) -> Command {
        match self {
            RangeOp::Write => Command::Program { address, key, data },
            RangeOp::Verify => Command::Verify { address, key, data },
            RangeOp::WriteData => Command::DataProgram { address, key, data },
        }
    }
}

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Code erase size in 1KiB blocks, the chip's full size when unset.
    pub erase_blocks: Option<u8>,
    /// Accept result 0xfe on a final short block of a whole-image write or verify.
    pub legacy_short_block_ack: bool,
    /// USB bulk transfer timeout.
    pub timeout: Duration,
}

impl Default for FlashOptions {
    fn default() -> Self {
        FlashOptions {
            erase_blocks: None,
            legacy_short_block_ack: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct Flashing<T: Transport> {
    transport: T,
    chip: Chip,
    options: FlashOptions,
    state: SessionState,
}

impl Flashing<UsbTransport> {
    /// Open the nth bootloader on the bus and run the connection sequence.
    pub fn new_from_usb(nth: usize, options: FlashOptions) -> Result<Self> {
        let chip = Chip::ch559()?;
        let transport =
            UsbTransport::open_nth(chip.vendor_id, chip.product_id, nth, options.timeout)
                .map_err(Error::ClaimFailed)?;
        let mut f = Flashing::new(transport, chip, options);
        f.connect()?;
        Ok(f)
    }
}

impl<T: Transport> Flashing<T> {
    /// Wrap a claimed transport. Nothing is sent until [`Flashing::connect`].
    pub fn new(transport: T, chip: Chip, options: FlashOptions) -> Self {
        Flashing {
            transport,
            chip,
            options,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    pub fn chip_id(&self) -> Option<u8> {
        self.state.chip_id()
    }

    pub fn bootloader_version(&self) -> Option<BootloaderVersion> {
        self.state.bootloader_version()
    }

    /// Detect, identify and unlock. Any failure leaves the session in `Failed`.
    pub fn connect(&mut self) -> Result<()> {
        let result = self.run_connect();
        if let Err(ref err) = result {
            if !matches!(err, Error::NotReady { .. }) {
                self.state = SessionState::Failed(FailReason::from(err));
            }
            log::error!("connect failed: {}", err);
        }
        result
    }

    fn run_connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(Error::NotReady {
                op: Operation::Detect,
                state: self.state,
            });
        }
        let resp = self
            .transport
            .transfer(Command::detect(self.chip.chip_id, self.chip.chip_type))?;
        self.state = self.state.on_detect(self.chip.chip_id, &resp)?;
        log::debug!("found chip: {}", self.chip);

        let resp = self.transport.transfer(Command::Identify)?;
        self.state = self.state.on_identify(&resp)?;
        if let Some(version) = self.state.bootloader_version() {
            log::info!("Bootloader version: {}", version);
        }

        let SessionState::Identified { key_seed, .. } = self.state else {
            return Err(Error::NotReady {
                op: Operation::Bootkey,
                state: self.state,
            });
        };
        let resp = self.transport.transfer(Command::Bootkey { seed: key_seed })?;
        self.state = self.state.on_bootkey(&resp)?;
        log::info!("Session unlocked");
        Ok(())
    }

    pub fn dump_info(&self) -> Result<()> {
        log::info!(
            "Chip: {} (CodeFlash: {}KiB, DataFlash: {}KiB @ 0x{:04x})",
            self.chip,
            self.chip.flash_size / 1024,
            self.chip.eeprom_size / 1024,
            self.chip.eeprom_start_addr
        );
        match self.bootloader_version() {
            Some(version) => log::info!("BTVER(bootloader version): {}", version),
            None => log::info!("BTVER(bootloader version): unknown"),
        }
        log::info!("Session: {}", self.state);
        Ok(())
    }

    /// Leave the bootloader and start the application. The device does not answer.
    pub fn reset(&mut self) -> Result<()> {
        self.state.require_ready(Operation::Boot)?;
        self.transport.transfer(Command::Boot)?;
        log::info!("Device reset");
        Ok(())
    }

    pub fn erase_code(&mut self, blocks: Option<u8>) -> Result<()> {
        self.state.require_ready(Operation::Erase)?;
        let mut blocks = blocks
            .or(self.options.erase_blocks)
            .unwrap_or(self.chip.erase_blocks);
        if blocks == 0 {
            blocks = 1;
            log::warn!("erase_code: too small block count, set to {}", blocks);
        }
        let resp = self.transport.transfer(Command::erase(blocks))?;
        if !resp.is_ok() {
            return Err(Error::EraseError {
                code: resp.result_code(),
            });
        }
        log::info!("Code Flash Erased ({} blocks)", blocks);
        Ok(())
    }

    pub fn erase_data(&mut self) -> Result<()> {
        self.state.require_ready(Operation::EraseData)?;
        let blocks = self.chip.data_erase_blocks();
        let resp = self.transport.transfer(Command::EraseData { blocks })?;
        if !resp.is_ok() {
            return Err(Error::EraseDataError {
                code: resp.result_code(),
            });
        }
        log::info!("Data Flash Erased");
        Ok(())
    }

    fn range_transfer(&mut self, op: RangeOp, address: u16, data: &[u8]) -> Result<Response> {
        let (key, _) = self.state.require_ready(op.operation())?;
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidLength {
                len: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        self.transport.transfer(op.command(address, key, data.to_vec()))
    }

    /// Write at most one frame of data to code or data flash.
    pub fn write_range(&mut self, region: Region, address: u16, data: &[u8]) -> Result<()> {
        let op = match region {
            Region::Code => RangeOp::Write,
            Region::Data => {
                self.state.require_ready(Operation::WriteData)?;
                self.check_data_bounds(address, data.len())?;
                RangeOp::WriteData
            }
        };
        let resp = self.range_transfer(op, address, data)?;
        check_range_result(op.operation(), address, &resp)
    }

    /// Verify at most one frame of data.
    ///
    /// Code flash is compared by the device, data flash is read back.
    pub fn verify_range(&mut self, region: Region, address: u16, data: &[u8]) -> Result<()> {
        match region {
            Region::Code => {
                let resp = self.range_transfer(RangeOp::Verify, address, data)?;
                check_range_result(Operation::Verify, address, &resp)
            }
            Region::Data => {
                let current = self.read_data_range(address, data.len())?;
                if let Some(i) = current.iter().zip(data).position(|(a, b)| a != b) {
                    return Err(Error::VerifyMismatch {
                        address: address.wrapping_add(i as u16),
                    });
                }
                Ok(())
            }
        }
    }

    /// Read at most one frame of data flash at `address` (offset from the data flash base).
    pub fn read_data_range(&mut self, address: u16, len: usize) -> Result<Vec<u8>> {
        self.state.require_ready(Operation::ReadData)?;
        if len > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidLength {
                len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        self.check_data_bounds(address, len)?;
        let resp = self.transport.transfer(Command::data_read(address, len as u8))?;
        if !resp.is_ok() {
            return Err(Error::ReadDataFailed {
                address,
                code: resp.result_code(),
            });
        }
        Ok(resp.read_payload(len).to_vec())
    }

    /// Program a whole image into code flash starting at address 0.
    pub fn flash(&mut self, raw: &[u8], progress: impl FnMut(f64)) -> Result<()> {
        self.whole_image(RangeOp::Write, raw, progress)?;
        log::info!("Code Flash Written ({} bytes)", raw.len());
        Ok(())
    }

    /// Compare a whole image against code flash starting at address 0.
    pub fn verify(&mut self, raw: &[u8], progress: impl FnMut(f64)) -> Result<()> {
        self.whole_image(RangeOp::Verify, raw, progress)?;
        log::info!("Code Flash Verified ({} bytes)", raw.len());
        Ok(())
    }

    fn whole_image(
        &mut self,
        range: RangeOp,
        raw: &[u8],
        mut progress: impl FnMut(f64),
    ) -> Result<()> {
        let op = range.operation();
        self.state.require_ready(op)?;
        let max = self.chip.flash_size as usize;
        if raw.len() > max {
            return Err(Error::FirmwareTooLarge {
                size: raw.len(),
                max,
            });
        }

        let total = raw.len();
        let mut address = 0usize;
        for chunk in raw.chunks(MAX_PAYLOAD_SIZE) {
            let resp = self.range_transfer(range, address as u16, chunk)?;
            let is_final_short = address + chunk.len() == total && chunk.len() < MAX_PAYLOAD_SIZE;
            if self.options.legacy_short_block_ack
                && is_final_short
                && resp.result_code() == LEGACY_SHORT_BLOCK_ACK
            {
                log::warn!(
                    "{}: accepting result 0x{:02x} on final short block at 0x{:04x}",
                    op,
                    LEGACY_SHORT_BLOCK_ACK,
                    address
                );
            } else {
                check_range_result(op, address as u16, &resp)?;
            }
            address += chunk.len();
            progress(address as f64 / total as f64);
        }
        Ok(())
    }

    /// Write `raw` into data flash at `offset`, frame by frame.
    pub fn write_data(&mut self, offset: u16, raw: &[u8], mut progress: impl FnMut(f64)) -> Result<()> {
        self.state.require_ready(Operation::WriteData)?;
        self.check_data_bounds(offset, raw.len())?;

        let total = raw.len();
        let mut done = 0usize;
        for chunk in raw.chunks(MAX_PAYLOAD_SIZE) {
            self.write_range(Region::Data, offset + done as u16, chunk)?;
            done += chunk.len();
            progress(done as f64 / total as f64);
        }
        log::info!("Data Flash Written ({} bytes)", total);
        Ok(())
    }

    /// Read `len` bytes of data flash from `offset`, frame by frame.
    pub fn read_data(&mut self, offset: u16, len: usize) -> Result<Vec<u8>> {
        self.state.require_ready(Operation::ReadData)?;
        self.check_data_bounds(offset, len)?;

        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let n = (len - out.len()).min(MAX_PAYLOAD_SIZE);
            let data = self.read_data_range(offset + out.len() as u16, n)?;
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Compare `raw` against data flash at `offset`.
    pub fn verify_data(&mut self, offset: u16, raw: &[u8]) -> Result<()> {
        self.state.require_ready(Operation::ReadData)?;
        self.check_data_bounds(offset, raw.len())?;

        for (i, chunk) in raw.chunks(MAX_PAYLOAD_SIZE).enumerate() {
            self.verify_range(Region::Data, offset + (i * MAX_PAYLOAD_SIZE) as u16, chunk)?;
        }
        log::info!("Data Flash Verified ({} bytes)", raw.len());
        Ok(())
    }

    fn check_data_bounds(&self, offset: u16, len: usize) -> Result<()> {
        let max = self.chip.eeprom_size as usize;
        if offset as usize + len > max {
            return Err(Error::FirmwareTooLarge {
                size: offset as usize + len,
                max,
            });
        }
        Ok(())
    }

    /// Rewrite the config high byte.
    ///
    /// Only 2.31 and 2.40 bootloaders are known. A wrong value can lock the
    /// chip out of the bootloader, callers must not retry this blindly.
    pub fn write_config(&mut self, high: u8) -> Result<()> {
        let (_, version) = self.state.require_ready(Operation::WriteConfig)?;
        let resp = self
            .transport
            .transfer(Command::write_config(version, high))?;
        if !resp.is_ok() {
            return Err(Error::WriteConfigFailed {
                code: resp.result_code(),
            });
        }
        log::info!("Config high byte set to 0x{:02x}", high);
        Ok(())
    }
}

/// Absolute data flash address of a data flash offset.
pub fn data_flash_address(offset: u16) -> u16 {
    DATA_FLASH_BASE.wrapping_add(offset)
}

fn check_range_result(op: Operation, address: u16, resp: &Response) -> Result<()> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            op,
            address,
            code: resp.result_code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::commands;
    use crate::transport::MockTransport;

    const CHIP_ID: u8 = 0x59;

    fn identify_response(version: [u8; 3], seed: [u8; 4]) -> Vec<u8> {
        let mut raw = vec![commands::IDENTIFY, 0x00, 0x1a, 0x00, 0x1f, 0x00];
        raw.resize(30, 0);
        raw[19..22].copy_from_slice(&version);
        raw[22..26].copy_from_slice(&seed);
        raw
    }

    fn queue_connect(mock: &MockTransport, version: [u8; 3]) {
        mock.queue_status(commands::DETECT, CHIP_ID);
        mock.queue_response(&identify_response(version, [0x10, 0x20, 0x30, 0x40]));
        mock.queue_status(commands::BOOTKEY, CHIP_ID);
    }

    fn connected(version: [u8; 3], options: FlashOptions) -> (Flashing<MockTransport>, MockTransport) {
        let mock = MockTransport::new();
        queue_connect(&mock, version);
        let mut f = Flashing::new(mock.clone(), Chip::ch559().unwrap(), options);
        f.connect().unwrap();
        mock.clear_writes();
        (f, mock)
    }

    #[test]
    fn connect_sequence() {
        let mock = MockTransport::new();
        queue_connect(&mock, [2, 3, 1]);
        let mut f = Flashing::new(mock.clone(), Chip::ch559().unwrap(), FlashOptions::default());
        assert!(!f.is_ready());
        f.connect().unwrap();

        assert!(f.is_ready());
        assert_eq!(f.chip_id(), Some(CHIP_ID));
        assert_eq!(f.bootloader_version().unwrap().to_string(), "2.31");

        let writes = mock.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0][0], commands::DETECT);
        assert_eq!(writes[1], [0xa7, 0x02, 0x00, 0x1f, 0x00]);
        let key = &writes[2];
        assert_eq!(key.len(), 0x33);
        assert_eq!(&key[..2], &[0xa3, 0x30]);
        assert!(key[3..].iter().all(|&b| b == 0xa0));
    }

    #[test]
    fn failed_detect_stops_the_sequence() {
        let mock = MockTransport::new();
        mock.queue_status(commands::DETECT, 0x58);
        let mut f = Flashing::new(mock.clone(), Chip::ch559().unwrap(), FlashOptions::default());
        let err = f.connect().unwrap_err();
        assert!(matches!(err, Error::DetectFailed { code: 0x58 }));
        assert_eq!(f.state(), SessionState::Failed(FailReason::DetectFailed));
        assert_eq!(mock.writes().len(), 1);

        assert!(matches!(f.erase_code(None), Err(Error::NotReady { .. })));
        assert!(matches!(f.flash(&[0; 8], |_| {}), Err(Error::NotReady { .. })));
        assert!(f.connect().is_err());
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn unknown_bootloader_fails_connect() {
        let mock = MockTransport::new();
        queue_connect(&mock, [2, 5, 0]);
        let mut f = Flashing::new(mock.clone(), Chip::ch559().unwrap(), FlashOptions::default());
        assert!(matches!(f.connect(), Err(Error::UnknownBootloader(_))));
        assert_eq!(f.state(), SessionState::Failed(FailReason::UnknownBootloader));
        assert_eq!(mock.writes().len(), 2);
    }

    #[test]
    fn rejected_bootkey_fails_connect() {
        let mock = MockTransport::new();
        mock.queue_status(commands::DETECT, CHIP_ID);
        mock.queue_response(&identify_response([2, 4, 0], [0; 4]));
        mock.queue_status(commands::BOOTKEY, 0x00);
        let mut f = Flashing::new(mock, Chip::ch559().unwrap(), FlashOptions::default());
        assert!(matches!(f.connect(), Err(Error::BootkeyError { .. })));
        assert_eq!(f.state(), SessionState::Failed(FailReason::BootkeyError));
    }

    #[test]
    fn transport_failure_during_connect() {
        let mock = MockTransport::new();
        mock.fail_next_write();
        let mut f = Flashing::new(mock, Chip::ch559().unwrap(), FlashOptions::default());
        assert!(matches!(f.connect(), Err(Error::Request { op: Operation::Detect, .. })));
        assert_eq!(
            f.state(),
            SessionState::Failed(FailReason::Transport(Operation::Detect))
        );
    }

    #[test]
    fn operations_before_connect_touch_nothing() {
        let mock = MockTransport::new();
        let mut f = Flashing::new(mock.clone(), Chip::ch559().unwrap(), FlashOptions::default());
        assert!(f.erase_code(None).is_err());
        assert!(f.erase_data().is_err());
        assert!(f.write_range(Region::Code, 0, &[1]).is_err());
        assert!(f.verify_range(Region::Code, 0, &[1]).is_err());
        assert!(f.read_data_range(0, 1).is_err());
        assert!(f.write_config(0x12).is_err());
        assert!(f.reset().is_err());
        assert!(mock.writes().is_empty());
        assert_eq!(mock.reads(), 0);
    }

    #[test]
    fn erase_uses_chip_default_and_reports_errors() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        mock.queue_status(commands::ERASE, 0);
        f.erase_code(None).unwrap();
        assert_eq!(mock.writes()[0], [0xa4, 0x01, 0x00, 60]);

        mock.queue_status(commands::ERASE, 0x01);
        assert!(matches!(f.erase_code(Some(8)), Err(Error::EraseError { code: 1 })));
        assert_eq!(mock.writes()[1], [0xa4, 0x01, 0x00, 8]);

        mock.queue_status(commands::DATA_ERASE, 0x02);
        assert!(matches!(f.erase_data(), Err(Error::EraseDataError { code: 2 })));
        assert_eq!(mock.writes()[2], [0xa9, 0x01, 0x00, 1]);
    }

    #[test]
    fn whole_image_chunks_and_progress() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        let image: Vec<u8> = (0..130).map(|i| i as u8).collect();
        for _ in 0..3 {
            mock.queue_status(commands::PROGRAM, 0);
        }
        let mut seen = vec![];
        f.flash(&image, |p| seen.push(p)).unwrap();

        let writes = mock.writes();
        assert_eq!(writes.len(), 3);
        let addresses: Vec<u16> = writes
            .iter()
            .map(|w| u16::from_le_bytes([w[3], w[4]]))
            .collect();
        assert_eq!(addresses, vec![0, 56, 112]);
        assert_eq!(writes[2][7], 18);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn failing_chunk_aborts_the_image() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        mock.queue_status(commands::VERIFY, 0);
        mock.queue_status(commands::VERIFY, 0xf5);
        mock.queue_status(commands::VERIFY, 0);
        let mut calls = 0;
        let err = f.verify(&[0u8; 150], |_| calls += 1).unwrap_err();
        assert!(matches!(
            err,
            Error::OperationFailed {
                op: Operation::Verify,
                address: 56,
                code: 0xf5
            }
        ));
        assert_eq!(mock.writes().len(), 2);
        assert_eq!(calls, 1);
    }

    #[test]
    fn legacy_short_block_ack_is_opt_in() {
        let (mut f, mock) = connected([2, 3, 1], FlashOptions::default());
        mock.queue_status(commands::PROGRAM, 0);
        mock.queue_status(commands::PROGRAM, LEGACY_SHORT_BLOCK_ACK);
        assert!(f.flash(&[0u8; 60], |_| {}).is_err());

        let options = FlashOptions {
            legacy_short_block_ack: true,
            ..Default::default()
        };
        let (mut f, mock) = connected([2, 3, 1], options);
        mock.queue_status(commands::PROGRAM, 0);
        mock.queue_status(commands::PROGRAM, LEGACY_SHORT_BLOCK_ACK);
        f.flash(&[0u8; 60], |_| {}).unwrap();

        // only the final short block qualifies
        mock.queue_status(commands::PROGRAM, LEGACY_SHORT_BLOCK_ACK);
        assert!(f.flash(&[0u8; 60], |_| {}).is_err());
        mock.queue_status(commands::PROGRAM, 0);
        mock.queue_status(commands::PROGRAM, LEGACY_SHORT_BLOCK_ACK);
        assert!(f.flash(&[0u8; 112], |_| {}).is_err());
    }

    #[test]
    fn oversized_image_is_rejected_up_front() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        let image = vec![0u8; 60 * 1024 + 1];
        assert!(matches!(
            f.flash(&image, |_| {}),
            Err(Error::FirmwareTooLarge { .. })
        ));
        assert!(matches!(
            f.write_range(Region::Code, 0, &[0u8; 57]),
            Err(Error::InvalidLength { len: 57, max: 56 })
        ));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn data_read_and_write() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        let mut resp = vec![commands::DATA_READ, 0, 0, 0, 0, 0];
        resp.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        mock.queue_response(&resp);
        assert_eq!(f.read_data_range(0x10, 8).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(mock.writes()[0], [0xab, 0x05, 0x00, 0x10, 0x00, 0x00, 0x00, 0x08]);

        mock.queue_status(commands::DATA_READ, 0x03);
        assert!(matches!(
            f.read_data_range(0x20, 4),
            Err(Error::ReadDataFailed { address: 0x20, code: 3 })
        ));

        mock.queue_status(commands::DATA_PROGRAM, 0);
        f.write_range(Region::Data, 0x08, &[0xaa; 8]).unwrap();
        let frame = &mock.writes()[2];
        assert_eq!(frame[0], commands::DATA_PROGRAM);
        assert_eq!(frame[15], 0xaa ^ CHIP_ID);
    }

    #[test]
    fn data_verify_reads_back() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        let mut resp = vec![commands::DATA_READ, 0, 0, 0, 0, 0];
        resp.extend_from_slice(&[1, 2, 9, 4]);
        mock.queue_response(&resp);
        assert!(matches!(
            f.verify_data(0x100, &[1, 2, 3, 4]),
            Err(Error::VerifyMismatch { address: 0x102 })
        ));
        assert!(matches!(
            f.read_data(0x3f0, 32),
            Err(Error::FirmwareTooLarge { .. })
        ));
    }

    #[test]
    fn data_range_ops_stay_inside_data_flash() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        assert!(matches!(
            f.verify_range(Region::Data, 0xffff, &[1, 2]),
            Err(Error::FirmwareTooLarge { .. })
        ));
        assert!(matches!(
            f.read_data_range(0x3fc, 8),
            Err(Error::FirmwareTooLarge { .. })
        ));
        assert!(matches!(
            f.write_range(Region::Data, 0x400, &[0]),
            Err(Error::FirmwareTooLarge { .. })
        ));
        assert!(mock.writes().is_empty());

        let mut resp = vec![commands::DATA_READ, 0, 0, 0, 0, 0];
        resp.extend_from_slice(&[1, 9]);
        mock.queue_response(&resp);
        assert!(matches!(
            f.verify_range(Region::Data, 0x3fe, &[1, 2]),
            Err(Error::VerifyMismatch { address: 0x3ff })
        ));
    }

    #[test]
    fn write_data_chunks() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        mock.queue_status(commands::DATA_PROGRAM, 0);
        mock.queue_status(commands::DATA_PROGRAM, 0);
        f.write_data(0x40, &[0x11; 60], |_| {}).unwrap();
        let writes = mock.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(&writes[1][3..5], &[0x78, 0x00]);
    }

    #[test]
    fn config_write_follows_version() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        mock.queue_status(commands::WRITE_CONFIG, 0);
        f.write_config(0x12).unwrap();
        assert_eq!(
            mock.writes()[0],
            [
                0xa8, 0x0e, 0x00, 0x07, 0x00, 0xff, 0xff, 0xff, 0xff, 0x23, 0x00, 0x00, 0x00,
                0xf6, 0x12, 0xff, 0x97
            ]
        );

        let (mut f, mock) = connected([2, 4, 1], FlashOptions::default());
        assert!(matches!(
            f.write_config(0x12),
            Err(Error::UnsupportedBootloaderVersion(_))
        ));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn boot_does_not_read() {
        let (mut f, mock) = connected([2, 4, 0], FlashOptions::default());
        let reads = mock.reads();
        f.reset().unwrap();
        assert_eq!(mock.writes()[0], [0xa2, 0x01, 0x00, 0x01]);
        assert_eq!(mock.reads(), reads);
    }

    #[test]
    fn data_flash_addresses() {
        assert_eq!(data_flash_address(0x10), 0xf010);
    }
}
