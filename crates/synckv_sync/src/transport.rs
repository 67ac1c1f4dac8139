//! Transport abstraction for moving sync records between devices.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use synckv_core::{DeviceId, KvStore, SyncRecord};

/// Moves sync records to and from named peer devices.
///
/// The network below this trait is pluggable; the coordinator only
/// assumes `pull` returns the peer's operations after a cursor and
/// `push` delivers local operations, returning the highest sequence
/// the peer acknowledged.
pub trait SyncTransport: Send + Sync {
    /// Whether the device currently answers at all.
    fn is_reachable(&self, device: &DeviceId) -> bool;

    /// Fetches the device's operations with sequence greater than
    /// `from_sequence`, waiting at most `timeout_ms`.
    fn pull(
        &self,
        device: &DeviceId,
        from_sequence: u64,
        timeout_ms: u64,
    ) -> SyncResult<Vec<SyncRecord>>;

    /// Delivers local operations to the device, waiting at most
    /// `timeout_ms`. Returns the highest sequence the device
    /// acknowledged.
    fn push(
        &self,
        device: &DeviceId,
        records: &[SyncRecord],
        timeout_ms: u64,
    ) -> SyncResult<u64>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    fn is_reachable(&self, device: &DeviceId) -> bool {
        (**self).is_reachable(device)
    }

    fn pull(
        &self,
        device: &DeviceId,
        from_sequence: u64,
        timeout_ms: u64,
    ) -> SyncResult<Vec<SyncRecord>> {
        (**self).pull(device, from_sequence, timeout_ms)
    }

    fn push(&self, device: &DeviceId, records: &[SyncRecord], timeout_ms: u64) -> SyncResult<u64> {
        (**self).push(device, records, timeout_ms)
    }
}

/// Scripted transport for unit tests.
#[derive(Default)]
pub struct MockTransport {
    reachable: RwLock<bool>,
    pull_response: Mutex<Option<SyncResult<Vec<SyncRecord>>>>,
    push_response: Mutex<Option<SyncResult<u64>>>,
    pull_calls: Mutex<Vec<(DeviceId, u64)>>,
    push_calls: Mutex<Vec<(DeviceId, usize)>>,
}

impl MockTransport {
    /// Creates a reachable mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reachable: RwLock::new(true),
            ..Self::default()
        }
    }

    /// Scripts the next pull result.
    pub fn set_pull_response(&self, response: SyncResult<Vec<SyncRecord>>) {
        *self.pull_response.lock() = Some(response);
    }

    /// Scripts the next push result.
    pub fn set_push_response(&self, response: SyncResult<u64>) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets reachability.
    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.write() = reachable;
    }

    /// Pull invocations seen so far, as `(device, from_sequence)`.
    #[must_use]
    pub fn pull_calls(&self) -> Vec<(DeviceId, u64)> {
        self.pull_calls.lock().clone()
    }

    /// Push invocations seen so far, as `(device, record_count)`.
    #[must_use]
    pub fn push_calls(&self) -> Vec<(DeviceId, usize)> {
        self.push_calls.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn is_reachable(&self, _device: &DeviceId) -> bool {
        *self.reachable.read()
    }

    fn pull(
        &self,
        device: &DeviceId,
        from_sequence: u64,
        _timeout_ms: u64,
    ) -> SyncResult<Vec<SyncRecord>> {
        self.pull_calls.lock().push((device.clone(), from_sequence));
        self.pull_response
            .lock()
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn push(
        &self,
        device: &DeviceId,
        records: &[SyncRecord],
        _timeout_ms: u64,
    ) -> SyncResult<u64> {
        self.push_calls.lock().push((device.clone(), records.len()));
        self.push_response.lock().take().unwrap_or_else(|| {
            Ok(records.iter().map(|r| r.sequence).max().unwrap_or(0))
        })
    }
}

/// In-process transport connecting stores directly, for integration
/// tests and single-process multi-store setups.
///
/// Each registered peer is another open [`KvStore`]. Pulls read the
/// peer's oplog; pushes apply records into the peer under this
/// transport's own device identity. Peers answer immediately, so the
/// timeout is never exercised.
pub struct LoopbackTransport {
    local_device: DeviceId,
    peers: RwLock<HashMap<DeviceId, Arc<KvStore>>>,
}

impl LoopbackTransport {
    /// Creates a transport identifying itself as `local_device` to its
    /// peers.
    #[must_use]
    pub fn new(local_device: DeviceId) -> Self {
        Self {
            local_device,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a peer store under a device id.
    pub fn register(&self, device: DeviceId, store: Arc<KvStore>) {
        self.peers.write().insert(device, store);
    }

    /// Removes a peer, making it unreachable.
    pub fn unregister(&self, device: &DeviceId) {
        self.peers.write().remove(device);
    }

    fn peer(&self, device: &DeviceId) -> SyncResult<Arc<KvStore>> {
        self.peers
            .read()
            .get(device)
            .cloned()
            .ok_or_else(|| SyncError::Unreachable {
                device: device.as_str().to_string(),
            })
    }
}

impl SyncTransport for LoopbackTransport {
    fn is_reachable(&self, device: &DeviceId) -> bool {
        self.peers
            .read()
            .get(device)
            .is_some_and(|store| store.is_open())
    }

    fn pull(
        &self,
        device: &DeviceId,
        from_sequence: u64,
        _timeout_ms: u64,
    ) -> SyncResult<Vec<SyncRecord>> {
        let peer = self.peer(device)?;
        Ok(peer.changes_since(from_sequence)?)
    }

    fn push(
        &self,
        device: &DeviceId,
        records: &[SyncRecord],
        _timeout_ms: u64,
    ) -> SyncResult<u64> {
        let peer = self.peer(device)?;
        peer.apply_remote(&self.local_device, records)?;
        Ok(records.iter().map(|r| r.sequence).max().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_defaults_to_empty_pull_and_full_ack() {
        let transport = MockTransport::new();
        let device = DeviceId::new("deviceA").unwrap();
        assert!(transport.is_reachable(&device));
        assert!(transport.pull(&device, 0, 1000).unwrap().is_empty());
        assert_eq!(transport.push(&device, &[], 1000).unwrap(), 0);
        assert_eq!(transport.pull_calls().len(), 1);
        assert_eq!(transport.push_calls().len(), 1);
    }

    #[test]
    fn mock_scripted_failure() {
        let transport = MockTransport::new();
        transport.set_pull_response(Err(SyncError::transport("boom")));
        let device = DeviceId::new("deviceA").unwrap();
        assert!(transport.pull(&device, 0, 1000).is_err());
        // Scripted response is consumed; next call falls back.
        assert!(transport.pull(&device, 0, 1000).is_ok());
    }

    #[test]
    fn loopback_unknown_peer_is_unreachable() {
        let transport = LoopbackTransport::new(DeviceId::new("nodeA").unwrap());
        let ghost = DeviceId::new("ghost").unwrap();
        assert!(!transport.is_reachable(&ghost));
        assert!(matches!(
            transport.pull(&ghost, 0, 1000),
            Err(SyncError::Unreachable { .. })
        ));
    }
}
