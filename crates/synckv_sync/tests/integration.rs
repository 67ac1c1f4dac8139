//! End-to-end reconciliation between two in-process stores.

use parking_lot::Mutex;
use std::sync::Arc;
use synckv_core::{
    DeviceId, KvManager, KvStoreType, ManagerConfig, Options, SubscribeType, SyncOutcome,
    SyncStatus, Value,
};
use synckv_sync::{LoopbackTransport, SyncCoordinator, SyncMode};

struct TestNode {
    _manager: KvManager,
    store: Arc<synckv_core::KvStore>,
    transport: Arc<LoopbackTransport>,
    coordinator: SyncCoordinator<Arc<LoopbackTransport>>,
    device: DeviceId,
}

fn test_node(bundle: &str, device: &str, options: Options) -> TestNode {
    let manager = KvManager::new(ManagerConfig::new(bundle).unwrap());
    let store = manager.get_store("storeId1", options).unwrap();
    let device = DeviceId::new(device).unwrap();
    let transport = Arc::new(LoopbackTransport::new(device.clone()));
    let coordinator = SyncCoordinator::new(Arc::clone(&store), Arc::clone(&transport));
    TestNode {
        _manager: manager,
        store,
        transport,
        coordinator,
        device,
    }
}

fn pair(options_a: Options, options_b: Options) -> (TestNode, TestNode) {
    let a = test_node("com.example.nodea", "nodeA", options_a);
    let b = test_node("com.example.nodeb", "nodeB", options_b);
    a.transport.register(b.device.clone(), Arc::clone(&b.store));
    b.transport.register(a.device.clone(), Arc::clone(&a.store));
    (a, b)
}

#[test]
fn push_only_delivers_local_changes() {
    let (a, b) = pair(Options::default(), Options::default());
    a.store.put("shared", Value::from("from A")).unwrap();

    let outcomes = a
        .coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();
    assert_eq!(outcomes[0].status, SyncStatus::Success);

    // Single-version receiver merges remote data into its own map.
    assert_eq!(b.store.get("shared").unwrap(), Value::from("from A"));
}

#[test]
fn pull_only_fetches_remote_changes() {
    let (a, b) = pair(Options::default(), Options::default());
    b.store.put("theirs", Value::from(7i64)).unwrap();

    let outcomes = a
        .coordinator
        .sync(&[b.device.clone()], SyncMode::PullOnly, None)
        .unwrap();
    assert_eq!(outcomes[0].status, SyncStatus::Success);
    assert_eq!(a.store.get("theirs").unwrap(), Value::from(7i64));
}

#[test]
fn push_pull_reconciles_both_directions() {
    let (a, b) = pair(Options::default(), Options::default());
    a.store.put("from_a", Value::from("a")).unwrap();
    b.store.put("from_b", Value::from("b")).unwrap();

    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushPull, None)
        .unwrap();

    assert_eq!(a.store.get("from_b").unwrap(), Value::from("b"));
    assert_eq!(b.store.get("from_a").unwrap(), Value::from("a"));
}

#[test]
fn repeated_sync_is_incremental() {
    let (a, b) = pair(Options::default(), Options::default());
    a.store.put("first", Value::from(1i64)).unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();

    a.store.put("second", Value::from(2i64)).unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();

    assert_eq!(b.store.get("first").unwrap(), Value::from(1i64));
    assert_eq!(b.store.get("second").unwrap(), Value::from(2i64));
}

#[test]
fn deletes_replicate() {
    let (a, b) = pair(Options::default(), Options::default());
    a.store.put("doomed", Value::from(1i64)).unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();
    assert!(b.store.get("doomed").is_ok());

    a.store.delete("doomed").unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();
    assert!(b.store.get("doomed").is_err());
}

#[test]
fn device_collaboration_receiver_keeps_replicas_separate() {
    let (a, b) = pair(
        Options::default(),
        Options::default().kv_store_type(KvStoreType::DeviceCollaboration),
    );
    b.store.put("k", Value::from("B's own")).unwrap();
    a.store.put("k", Value::from("A's view")).unwrap();

    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();

    assert_eq!(b.store.get("k").unwrap(), Value::from("B's own"));
    assert_eq!(
        b.store.get_on_device(&a.device, "k").unwrap(),
        Value::from("A's view")
    );
}

#[test]
fn sync_complete_event_reports_every_device() {
    let (a, b) = pair(Options::default(), Options::default());
    let seen: Arc<Mutex<Vec<SyncOutcome>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    a.store
        .on_sync_complete(Arc::new(move |outcomes: &[SyncOutcome]| {
            captured.lock().extend_from_slice(outcomes);
        }))
        .unwrap();

    let ghost = DeviceId::new("ghost").unwrap();
    a.store.put("k", Value::from(1i64)).unwrap();
    a.coordinator
        .sync(&[b.device.clone(), ghost.clone()], SyncMode::PushPull, None)
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].device, b.device);
    assert_eq!(seen[0].status, SyncStatus::Success);
    assert_eq!(seen[1].device, ghost);
    assert_eq!(seen[1].status, SyncStatus::Unreachable);
}

#[test]
fn remote_changes_raise_remote_filtered_notifications() {
    let (a, b) = pair(Options::default(), Options::default());
    let notified: Arc<Mutex<Vec<DeviceId>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&notified);
    b.store
        .on_data_change(
            SubscribeType::Remote,
            Arc::new(move |notification| {
                captured.lock().push(notification.device_id.clone());
            }),
        )
        .unwrap();

    a.store.put("k", Value::from(1i64)).unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();

    let notified = notified.lock();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0], a.device);
}

#[test]
fn remove_device_data_after_sync() {
    let (a, b) = pair(
        Options::default(),
        Options::default().kv_store_type(KvStoreType::DeviceCollaboration),
    );
    b.store.put("own", Value::from("kept")).unwrap();
    a.store.put("synced", Value::from("transient")).unwrap();
    a.coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();
    assert!(b.store.get_on_device(&a.device, "synced").is_ok());

    b.store.remove_device_data(&a.device).unwrap();

    assert!(b.store.get_on_device(&a.device, "synced").is_err());
    assert_eq!(b.store.get("own").unwrap(), Value::from("kept"));
}

#[test]
fn disjoint_labels_block_reconciliation() {
    let (a, b) = pair(Options::default(), Options::default());
    a.store
        .set_sync_range(&["payments".into()], &["media".into()])
        .unwrap();
    a.store.put("blocked", Value::from(1i64)).unwrap();

    let outcomes = a
        .coordinator
        .sync(&[b.device.clone()], SyncMode::PushPull, None)
        .unwrap();
    assert_eq!(outcomes[0].status, SyncStatus::NotEligible);
    assert!(b.store.get("blocked").is_err());

    // Intersecting labels open the gate again.
    a.store
        .set_sync_range(&["payments".into()], &["payments".into()])
        .unwrap();
    let outcomes = a
        .coordinator
        .sync(&[b.device.clone()], SyncMode::PushPull, None)
        .unwrap();
    assert_eq!(outcomes[0].status, SyncStatus::Success);
    assert_eq!(b.store.get("blocked").unwrap(), Value::from(1i64));
}

#[test]
fn closed_peer_is_unreachable() {
    let (a, b) = pair(Options::default(), Options::default());
    b._manager
        .close_store("com.example.nodeb", "storeId1")
        .unwrap();

    a.store.put("k", Value::from(1i64)).unwrap();
    let outcomes = a
        .coordinator
        .sync(&[b.device.clone()], SyncMode::PushOnly, None)
        .unwrap();
    assert_eq!(outcomes[0].status, SyncStatus::Unreachable);
}
