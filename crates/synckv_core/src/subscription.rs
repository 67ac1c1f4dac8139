//! Change notification hub.
//!
//! The hub owns the authoritative subscriber lists. Both caller threads
//! (subscribe/unsubscribe) and the commit path (delivery) touch them, so
//! each list sits behind a mutex; delivery snapshots the list and runs
//! callbacks without holding it.

use crate::error::{KvError, KvResult};
use crate::types::{ChangeOrigin, DeviceId, SyncOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use synckv_codec::Entry;

/// Maximum concurrent data-change subscriptions per store.
///
/// A resource-protection bound: the 9th subscription attempt fails with
/// [`KvError::TooManySubscriptions`].
pub const MAX_DATA_SUBSCRIPTIONS: usize = 8;

/// Which mutation origins a data-change subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeType {
    /// Only mutations committed on this node.
    Local = 0,
    /// Only mutations applied from remote devices during sync.
    Remote = 1,
    /// Both.
    All = 2,
}

impl SubscribeType {
    fn matches(self, origin: &ChangeOrigin) -> bool {
        match (self, origin) {
            (Self::All, _) => true,
            (Self::Local, ChangeOrigin::Local) => true,
            (Self::Remote, ChangeOrigin::Remote(_)) => true,
            _ => false,
        }
    }
}

/// The aggregated diff delivered after each committing mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    /// Device the change originated from; the reserved local id for
    /// changes committed on this node.
    pub device_id: DeviceId,
    /// Entries that did not exist before.
    pub inserts: Vec<Entry>,
    /// Entries whose value changed.
    pub updates: Vec<Entry>,
    /// Entries that were removed, with their last value.
    pub deletes: Vec<Entry>,
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback receiving data-change notifications.
pub type DataChangeCallback = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

/// Callback receiving per-device sync outcomes.
pub type SyncCompleteCallback = Arc<dyn Fn(&[SyncOutcome]) + Send + Sync>;

struct DataSubscription {
    id: SubscriptionId,
    filter: SubscribeType,
    callback: DataChangeCallback,
}

struct SyncSubscription {
    id: SubscriptionId,
    callback: SyncCompleteCallback,
}

/// Observer registry for one store.
pub(crate) struct NotificationHub {
    data: Mutex<Vec<DataSubscription>>,
    sync: Mutex<Vec<SyncSubscription>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    pub(crate) fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            sync: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers a data-change subscription, enforcing the per-store bound.
    pub(crate) fn subscribe_data_change(
        &self,
        filter: SubscribeType,
        callback: DataChangeCallback,
    ) -> KvResult<SubscriptionId> {
        let mut data = self.data.lock();
        if data.len() >= MAX_DATA_SUBSCRIPTIONS {
            return Err(KvError::TooManySubscriptions {
                limit: MAX_DATA_SUBSCRIPTIONS,
            });
        }
        let id = self.allocate_id();
        data.push(DataSubscription {
            id,
            filter,
            callback,
        });
        Ok(id)
    }

    /// Removes a data-change subscription. Unknown ids are a no-op.
    pub(crate) fn unsubscribe_data_change(&self, id: SubscriptionId) {
        self.data.lock().retain(|sub| sub.id != id);
    }

    /// Registers a sync-complete subscription (unbounded).
    pub(crate) fn subscribe_sync_complete(
        &self,
        callback: SyncCompleteCallback,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.sync.lock().push(SyncSubscription { id, callback });
        id
    }

    /// Removes a sync-complete subscription. Unknown ids are a no-op.
    pub(crate) fn unsubscribe_sync_complete(&self, id: SubscriptionId) {
        self.sync.lock().retain(|sub| sub.id != id);
    }

    /// Delivers one notification to matching subscribers in
    /// subscription order.
    pub(crate) fn notify_data_change(
        &self,
        origin: &ChangeOrigin,
        notification: &ChangeNotification,
    ) {
        let callbacks: Vec<DataChangeCallback> = {
            let data = self.data.lock();
            data.iter()
                .filter(|sub| sub.filter.matches(origin))
                .map(|sub| Arc::clone(&sub.callback))
                .collect()
        };
        for callback in callbacks {
            callback(notification);
        }
    }

    /// Delivers sync outcomes to every sync-complete subscriber.
    pub(crate) fn notify_sync_complete(&self, outcomes: &[SyncOutcome]) {
        let callbacks: Vec<SyncCompleteCallback> = {
            let sync = self.sync.lock();
            sync.iter().map(|sub| Arc::clone(&sub.callback)).collect()
        };
        for callback in callbacks {
            callback(outcomes);
        }
    }

    /// Drops every subscription (store close path); nothing is delivered
    /// afterwards.
    pub(crate) fn clear(&self) {
        self.data.lock().clear();
        self.sync.lock().clear();
    }

    pub(crate) fn data_subscription_count(&self) -> usize {
        self.data.lock().len()
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("data_subscriptions", &self.data_subscription_count())
            .field("sync_subscriptions", &self.sync.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncStatus;
    use std::sync::atomic::AtomicUsize;

    fn notification(device: DeviceId) -> ChangeNotification {
        ChangeNotification {
            device_id: device,
            inserts: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    fn counting_callback() -> (Arc<AtomicUsize>, DataChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        let callback: DataChangeCallback = Arc::new(move |_| {
            captured.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn ninth_data_subscription_fails() {
        let hub = NotificationHub::new();
        for _ in 0..MAX_DATA_SUBSCRIPTIONS {
            let (_, cb) = counting_callback();
            hub.subscribe_data_change(SubscribeType::All, cb).unwrap();
        }
        let (_, cb) = counting_callback();
        let err = hub.subscribe_data_change(SubscribeType::All, cb).unwrap_err();
        assert!(matches!(err, KvError::TooManySubscriptions { limit: 8 }));
    }

    #[test]
    fn unsubscribe_frees_a_slot() {
        let hub = NotificationHub::new();
        let mut last = None;
        for _ in 0..MAX_DATA_SUBSCRIPTIONS {
            let (_, cb) = counting_callback();
            last = Some(hub.subscribe_data_change(SubscribeType::All, cb).unwrap());
        }
        hub.unsubscribe_data_change(last.unwrap());
        let (_, cb) = counting_callback();
        assert!(hub.subscribe_data_change(SubscribeType::All, cb).is_ok());
    }

    #[test]
    fn unsubscribe_unknown_id_is_noop() {
        let hub = NotificationHub::new();
        hub.unsubscribe_data_change(SubscriptionId(999));
        hub.unsubscribe_sync_complete(SubscriptionId(999));
    }

    #[test]
    fn filter_local_skips_remote_changes() {
        let hub = NotificationHub::new();
        let (local_count, local_cb) = counting_callback();
        let (remote_count, remote_cb) = counting_callback();
        let (all_count, all_cb) = counting_callback();
        hub.subscribe_data_change(SubscribeType::Local, local_cb).unwrap();
        hub.subscribe_data_change(SubscribeType::Remote, remote_cb).unwrap();
        hub.subscribe_data_change(SubscribeType::All, all_cb).unwrap();

        hub.notify_data_change(
            &ChangeOrigin::Local,
            &notification(DeviceId::local()),
        );
        let device = DeviceId::new("deviceA").unwrap();
        hub.notify_data_change(
            &ChangeOrigin::Remote(device.clone()),
            &notification(device),
        );

        assert_eq!(local_count.load(Ordering::SeqCst), 1);
        assert_eq!(remote_count.load(Ordering::SeqCst), 1);
        assert_eq!(all_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_stops_delivery() {
        let hub = NotificationHub::new();
        let (count, cb) = counting_callback();
        hub.subscribe_data_change(SubscribeType::All, cb).unwrap();
        hub.clear();
        hub.notify_data_change(&ChangeOrigin::Local, &notification(DeviceId::local()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.data_subscription_count(), 0);
    }

    #[test]
    fn sync_complete_delivery() {
        let hub = NotificationHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        hub.subscribe_sync_complete(Arc::new(move |outcomes: &[SyncOutcome]| {
            captured.lock().extend_from_slice(outcomes);
        }));

        let device = DeviceId::new("deviceA").unwrap();
        hub.notify_sync_complete(&[SyncOutcome::new(device.clone(), SyncStatus::Success)]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].device, device);
        assert_eq!(seen[0].status, SyncStatus::Success);
    }
}
