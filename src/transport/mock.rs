//! Scripted transport for testing session logic without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Transport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    reads: usize,
    fail_write: bool,
    fail_read: bool,
}

/// Returns queued responses in order and records every written frame.
///
/// Clones share state, so a test can keep a handle while the session owns the transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a panic while holding the lock only happens inside a failing test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response to be returned on the next read.
    pub fn queue_response(&self, raw: &[u8]) {
        self.state().responses.push_back(raw.to_vec());
    }

    /// Queue a 6 byte status response carrying `code` at offset 4.
    pub fn queue_status(&self, cmd: u8, code: u8) {
        self.queue_response(&[cmd, 0x00, 0x02, 0x00, code, 0x00]);
    }

    /// All frames written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    /// Number of reads attempted.
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn fail_next_write(&self) {
        self.state().fail_write = true;
    }

    pub fn fail_next_read(&self) {
        self.state().fail_read = true;
    }
}

impl Transport for MockTransport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_write) {
            return Err(TransportError::Injected("write failed".into()));
        }
        state.writes.push(raw.to_vec());
        Ok(())
    }

    fn recv_raw(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        state.reads += 1;
        if std::mem::take(&mut state.fail_read) {
            return Err(TransportError::Injected("read failed".into()));
        }
        let mut resp = state.responses.pop_front().ok_or(TransportError::Exhausted)?;
        resp.truncate(max_len);
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_are_returned_in_order() {
        let mut mock = MockTransport::new();
        mock.queue_response(&[1, 2, 3]);
        mock.queue_response(&[4]);
        assert_eq!(mock.recv_raw(64).unwrap(), vec![1, 2, 3]);
        assert_eq!(mock.recv_raw(64).unwrap(), vec![4]);
        assert!(matches!(mock.recv_raw(64), Err(TransportError::Exhausted)));
        assert_eq!(mock.reads(), 3);
    }

    #[test]
    fn clones_share_write_log() {
        let handle = MockTransport::new();
        let mut owned = handle.clone();
        owned.send_raw(b"Hello").unwrap();
        owned.send_raw(b"World").unwrap();
        assert_eq!(handle.writes(), vec![b"Hello".to_vec(), b"World".to_vec()]);
        handle.clear_writes();
        assert!(owned.writes().is_empty());
    }

    #[test]
    fn injected_failures_fire_once() {
        let mut mock = MockTransport::new();
        mock.fail_next_write();
        assert!(mock.send_raw(&[0]).is_err());
        assert!(mock.send_raw(&[0]).is_ok());
        assert_eq!(mock.writes().len(), 1);
    }
}
