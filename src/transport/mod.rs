//! Abstract Device transport interface.
use thiserror::Error;

use crate::constants::RESULT_OFFSET;
use crate::error::{Error, Operation, Result};
use crate::protocol::{Command, Response};

pub use self::mock::MockTransport;
pub use self::usb::{DEFAULT_TIMEOUT, UsbTransport};

mod mock;
mod usb;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device {vid:04x}:{pid:04x} not found at index #{index}")]
    DeviceNotFound { vid: u16, pid: u16, index: usize },

    #[error("bulk {0} endpoint not found")]
    EndpointNotFound(&'static str),

    #[error("no response queued")]
    Exhausted,

    #[error("{0}")]
    Injected(String),

    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

/// Abstraction of the transport layer.
///
/// One bulk OUT and one bulk IN endpoint on an already claimed interface.
pub trait Transport {
    fn send_raw(&mut self, raw: &[u8]) -> std::result::Result<(), TransportError>;
    fn recv_raw(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportError>;

    /// One write then one read. A `response_len` of zero skips the read.
    fn execute(&mut self, op: Operation, req: &[u8], response_len: usize) -> Result<Response> {
        log::debug!("=> {}", hex::encode(req));
        self.send_raw(req)
            .map_err(|source| Error::Request { op, source })?;
        if response_len == 0 {
            return Ok(Response::default());
        }

        let resp = self
            .recv_raw(response_len)
            .map_err(|source| Error::Response { op, source })?;
        log::debug!("<= {}", hex::encode(&resp));
        // failures come back as a bare status reply, let the caller classify the code
        let reports_failure = resp.get(RESULT_OFFSET).is_some_and(|&code| code != 0);
        if resp.len() < response_len && !reports_failure {
            return Err(Error::ShortResponse {
                op,
                expected: response_len,
                actual: resp.len(),
            });
        }
        Ok(Response::new(resp))
    }

    fn transfer(&mut self, cmd: Command) -> Result<Response> {
        let op = cmd.operation();
        let response_len = cmd.response_size();
        let req = cmd.into_raw()?;
        self.execute(op, &req, response_len)
    }
}
