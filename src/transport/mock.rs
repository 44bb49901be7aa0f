//! # Mock Transport
//!
//! Scripted in-memory [`Transport`] for tests. Devices are attached and
//! detached by the test, incoming serial bytes are pushed into a shared
//! buffer, and every `write` on an open handle is recorded as one discrete
//! entry so tests can assert on write boundaries (no interleaving between
//! concurrent print jobs).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Connection, DeviceIdentity, OpenError, Transport, TransferError};

#[derive(Default)]
struct MockState {
    /// Attached devices and whether a handle can be opened without a grant
    devices: Vec<(DeviceIdentity, bool)>,
    /// Identities passed to `request_permission`, in call order
    permission_requests: Vec<DeviceIdentity>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Test double for the USB/serial boundary.
///
/// Cloning is shallow; clones observe the same device set, write log and
/// incoming buffer.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<VecDeque<u8>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device. `connectable` mirrors whether the platform would
    /// hand out a handle without a permission prompt.
    pub fn attach(&self, identity: DeviceIdentity, connectable: bool) {
        let mut state = self.state.lock().unwrap();
        state.devices.retain(|(id, _)| *id != identity);
        state.devices.push((identity, connectable));
    }

    /// Remove a device from the bus.
    pub fn detach(&self, identity: DeviceIdentity) {
        self.state
            .lock()
            .unwrap()
            .devices
            .retain(|(id, _)| *id != identity);
    }

    /// Mark a device as openable, as the platform does after a grant.
    pub fn grant(&self, identity: DeviceIdentity) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.devices.iter_mut().find(|(id, _)| *id == identity) {
            entry.1 = true;
        }
    }

    /// Queue bytes for the next `read_available` on any open handle.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.incoming.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Every `write` call recorded on any handle, one entry per call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// All bytes written, concatenated in write order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes.lock().unwrap().concat()
    }

    pub fn permission_requests(&self) -> Vec<DeviceIdentity> {
        self.state.lock().unwrap().permission_requests.clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }
}

impl Transport for MockTransport {
    fn enumerate(&self) -> Vec<(DeviceIdentity, bool)> {
        self.state.lock().unwrap().devices.clone()
    }

    fn open_for_writing(
        &self,
        identity: DeviceIdentity,
    ) -> Result<Box<dyn Connection>, OpenError> {
        let state = self.state.lock().unwrap();
        match state.devices.iter().find(|(id, _)| *id == identity) {
            None => Err(OpenError::NotFound),
            Some((_, false)) => Err(OpenError::PermissionRequired),
            Some((_, true)) => Ok(Box::new(MockConnection {
                state: Arc::clone(&self.state),
                writes: Arc::clone(&self.writes),
                incoming: Arc::clone(&self.incoming),
            })),
        }
    }

    fn request_permission(&self, identity: DeviceIdentity) {
        self.state.lock().unwrap().permission_requests.push(identity);
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<VecDeque<u8>>>,
}

impl Connection for MockConnection {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        if self.state.lock().unwrap().fail_writes {
            return Err(TransferError("mock write failure".into()));
        }
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn available(&mut self) -> Result<usize, TransferError> {
        if self.state.lock().unwrap().fail_reads {
            return Err(TransferError("mock read failure".into()));
        }
        Ok(self.incoming.lock().unwrap().len())
    }

    fn read_available(&mut self, max: usize) -> Result<Option<Vec<u8>>, TransferError> {
        if self.state.lock().unwrap().fail_reads {
            return Err(TransferError("mock read failure".into()));
        }
        let mut incoming = self.incoming.lock().unwrap();
        if incoming.is_empty() {
            return Ok(None);
        }
        let n = max.min(incoming.len());
        Ok(Some(incoming.drain(..n).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: DeviceIdentity = DeviceIdentity::new(0x4b55, 0x3558);

    #[test]
    fn test_open_unknown_device() {
        let transport = MockTransport::new();
        assert_eq!(
            transport.open_for_writing(SCALE).err(),
            Some(OpenError::NotFound)
        );
    }

    #[test]
    fn test_permission_flow() {
        let transport = MockTransport::new();
        transport.attach(SCALE, false);
        assert_eq!(
            transport.open_for_writing(SCALE).err(),
            Some(OpenError::PermissionRequired)
        );
        transport.grant(SCALE);
        assert!(transport.open_for_writing(SCALE).is_ok());
    }

    #[test]
    fn test_write_boundaries_recorded() {
        let transport = MockTransport::new();
        transport.attach(SCALE, true);
        let mut conn = transport.open_for_writing(SCALE).unwrap();
        conn.write(b"abc").unwrap();
        conn.write(b"de").unwrap();
        assert_eq!(transport.writes(), vec![b"abc".to_vec(), b"de".to_vec()]);
    }

    #[test]
    fn test_read_drains_incoming() {
        let transport = MockTransport::new();
        transport.attach(SCALE, true);
        let mut conn = transport.open_for_writing(SCALE).unwrap();
        transport.push_incoming(&[0xDE, 0xAD]);
        assert_eq!(conn.available().unwrap(), 2);
        assert_eq!(conn.read_available(16).unwrap(), Some(vec![0xDE, 0xAD]));
        assert_eq!(conn.read_available(16).unwrap(), None);
    }
}
