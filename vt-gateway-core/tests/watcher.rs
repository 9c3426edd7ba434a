mod common;

use common::{addr, connected_harness, RecordingStore};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use vt_gateway_core::{ChangeWatcher, MonitoredGroup, PollOutcome, WatcherConfig};
use vt_gateway_sdk::DeviceValue;

const GROUP: &str = "Daten_Strommessung/Ventil1";

fn watcher(h: &common::Harness, store: Arc<RecordingStore>) -> ChangeWatcher {
    ChangeWatcher::new(
        Arc::clone(&h.orchestrator),
        store,
        WatcherConfig {
            interval: Duration::from_millis(100),
            monitored: vec![MonitoredGroup::new(1, GROUP)],
            ..Default::default()
        },
    )
}

fn seed_group(h: &common::Harness) {
    h.device.set(addr(1, GROUP, "Status"), DeviceValue::Int16(2));
    h.device.set(addr(1, GROUP, "MessIDCurrent"), DeviceValue::Int32(77));
    h.device.set(
        addr(1, GROUP, "Strom"),
        DeviceValue::Array(vec![DeviceValue::Int16(5), DeviceValue::Int16(6)]),
    );
}

#[tokio::test]
async fn persists_once_per_increment() {
    let h = connected_harness().await;
    seed_group(&h);
    let store = Arc::new(RecordingStore::default());
    let watcher = watcher(&h, Arc::clone(&store));

    // The counter is part of the group, so it is set rather than scripted:
    // the snapshot read must see the same value the poll saw.
    let mut outcomes = Vec::new();
    for counter in [0, 1, 1, 3, 2, 2] {
        h.device.set(addr(1, GROUP, "DatenReady"), DeviceValue::Int32(counter));
        outcomes.push(watcher.poll_group(1, GROUP).await);
    }
    assert_eq!(
        outcomes,
        [
            PollOutcome::Seeded(0),
            PollOutcome::Persisted(1),
            PollOutcome::Unchanged(1),
            PollOutcome::Persisted(3),
            PollOutcome::Rebased(2),
            PollOutcome::Unchanged(2),
        ]
    );

    let saved = store.saved();
    assert_eq!(saved.iter().map(|s| s.counter).collect::<Vec<_>>(), [1, 3]);
    assert_eq!(watcher.baseline(1, GROUP), Some(2));

    let snapshot = &saved[1];
    assert_eq!(snapshot.block, 1);
    assert_eq!(snapshot.group, GROUP);
    let strom = snapshot.parameters.iter().find(|p| p.name == "Strom").unwrap();
    assert_eq!(strom.value, r#"["5","6"]"#);
    assert_eq!(strom.data_type.as_deref(), Some("Int16[]"));
}

#[tokio::test]
async fn unreadable_counters_are_skipped() {
    let h = connected_harness().await;
    let store = Arc::new(RecordingStore::default());
    let watcher = watcher(&h, Arc::clone(&store));

    // Mapped but never set on the device.
    assert_eq!(watcher.poll_group(1, GROUP).await, PollOutcome::Skipped);
    // Not mapped at all.
    assert_eq!(watcher.poll_group(3, GROUP).await, PollOutcome::Skipped);
    assert_eq!(watcher.poll_group(1, "Unbekannt").await, PollOutcome::Skipped);
    // Not numeric.
    h.device.set(addr(1, GROUP, "DatenReady"), DeviceValue::String("n/a".into()));
    assert_eq!(watcher.poll_group(1, GROUP).await, PollOutcome::Skipped);

    assert_eq!(watcher.baseline(1, GROUP), None);
    assert!(store.saved().is_empty());
}

#[tokio::test]
async fn failed_save_does_not_replay() {
    let h = connected_harness().await;
    seed_group(&h);
    let store = Arc::new(RecordingStore::default());
    store.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let watcher = watcher(&h, Arc::clone(&store));
    let ready = addr(1, GROUP, "DatenReady");

    h.device.set(ready.clone(), DeviceValue::Int32(4));
    assert_eq!(watcher.poll_group(1, GROUP).await, PollOutcome::Seeded(4));
    h.device.set(ready.clone(), DeviceValue::Int32(5));
    assert_eq!(watcher.poll_group(1, GROUP).await, PollOutcome::Lost(5));
    assert_eq!(watcher.poll_group(1, GROUP).await, PollOutcome::Unchanged(5));
    assert!(store.saved().is_empty());
}

#[tokio::test]
async fn loop_stops_on_cancel() {
    let h = connected_harness().await;
    seed_group(&h);
    h.device.script(
        addr(1, GROUP, "DatenReady"),
        vec![DeviceValue::Int32(10), DeviceValue::Int32(11)],
    );
    let store = Arc::new(RecordingStore::default());
    let watcher = Arc::new(watcher(&h, Arc::clone(&store)));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&watcher).run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(2), async {
        while store.saved().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("snapshot persisted");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("watcher exits promptly")
        .unwrap();
    assert_eq!(store.saved()[0].counter, 11);
}

#[tokio::test]
async fn cancel_lets_an_in_flight_save_finish() {
    let h = connected_harness().await;
    seed_group(&h);
    h.device.script(
        addr(1, GROUP, "DatenReady"),
        vec![DeviceValue::Int32(1), DeviceValue::Int32(2)],
    );
    let store = Arc::new(RecordingStore::default());
    *store.save_delay.lock().unwrap() = Some(Duration::from_millis(300));
    let watcher = Arc::new(watcher(&h, Arc::clone(&store)));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&watcher).run(cancel.clone()));

    // The baseline moves before the save starts, so cancel lands mid-save.
    tokio::time::timeout(Duration::from_secs(2), async {
        while watcher.baseline(1, GROUP) != Some(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("counter advanced");
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("watcher exits after the save")
        .unwrap();
    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].counter, 2);
}

#[tokio::test]
async fn intervals_have_a_floor() {
    let h = connected_harness().await;
    let store = Arc::new(RecordingStore::default());
    let watcher = ChangeWatcher::new(
        Arc::clone(&h.orchestrator),
        store,
        WatcherConfig {
            interval: Duration::from_millis(10),
            ..Default::default()
        },
    );
    assert_eq!(watcher.interval(), Duration::from_millis(100));
    assert_eq!(watcher.monitored().len(), 4 * 49);
}
