//! USB Transportation.
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};

use super::{Transport, TransportError};

/// Bulk transfers never exceed one full speed packet.
const MAX_PACKET_SIZE: usize = 64;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct UsbTransport {
    device_handle: DeviceHandle<Context>,
    endpoint_in: u8,
    endpoint_out: u8,
    timeout: Duration,
}

fn matches_ids(device: &rusb::Device<Context>, vendor_id: u16, product_id: u16) -> bool {
    device
        .device_descriptor()
        .map(|desc| desc.vendor_id() == vendor_id && desc.product_id() == product_id)
        .unwrap_or(false)
}

impl UsbTransport {
    /// Count attached devices with the given USB ids.
    pub fn scan_devices(vendor_id: u16, product_id: u16) -> Result<usize, TransportError> {
        let context = Context::new()?;

        let n = context
            .devices()?
            .iter()
            .filter(|device| matches_ids(device, vendor_id, product_id))
            .enumerate()
            .map(|(i, device)| {
                log::debug!("Found CH55x bootloader USB device #{}: [{:?}]", i, device);
            })
            .count();
        Ok(n)
    }

    /// Open the nth device with the given USB ids, claim its first interface and pick its
    /// bulk endpoints.
    pub fn open_nth(
        vendor_id: u16,
        product_id: u16,
        nth: usize,
        timeout: Duration,
    ) -> Result<UsbTransport, TransportError> {
        let context = Context::new()?;

        let device = context
            .devices()?
            .iter()
            .filter(|device| matches_ids(device, vendor_id, product_id))
            .nth(nth)
            .ok_or(TransportError::DeviceNotFound {
                vid: vendor_id,
                pid: product_id,
                index: nth,
            })?;
        log::debug!("Found USB Device {:?}", device);

        let mut device_handle = device.open()?;
        let config = device.config_descriptor(0)?;

        let mut endpoint_in = None;
        let mut endpoint_out = None;
        let mut interface_number = 0;
        if let Some(intf) = config.interfaces().next() {
            if let Some(desc) = intf.descriptors().next() {
                interface_number = desc.interface_number();
                for endpoint in desc.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => endpoint_in = Some(endpoint.address()),
                        Direction::Out => endpoint_out = Some(endpoint.address()),
                    }
                }
            }
        }
        let endpoint_in = endpoint_in.ok_or(TransportError::EndpointNotFound("IN"))?;
        let endpoint_out = endpoint_out.ok_or(TransportError::EndpointNotFound("OUT"))?;
        log::debug!(
            "Using interface {} IN 0x{:02x} OUT 0x{:02x}",
            interface_number,
            endpoint_in,
            endpoint_out
        );

        device_handle.set_active_configuration(config.number())?;
        device_handle.claim_interface(interface_number)?;

        Ok(UsbTransport {
            device_handle,
            endpoint_in,
            endpoint_out,
            timeout,
        })
    }
}

impl Transport for UsbTransport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<(), TransportError> {
        self.device_handle
            .write_bulk(self.endpoint_out, raw, self.timeout)?;
        Ok(())
    }

    fn recv_raw(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; max_len.max(MAX_PACKET_SIZE)];
        let nread = self
            .device_handle
            .read_bulk(self.endpoint_in, &mut buf, self.timeout)?;
        buf.truncate(nread);
        Ok(buf)
    }
}
