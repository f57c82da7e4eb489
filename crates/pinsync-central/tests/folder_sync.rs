// SPDX-License-Identifier: AGPL-3.0
// Two devices sharing one mounted folder

use pinsync_central::{
    Central, CentralConfig, DeviceRef, FolderTransport, LocalStore, PinSync, SyncReport,
};
use pinsync_core::manifest::{DATABASE, DATABASE_SHM, DATABASE_WAL};
use pinsync_core::{AccessDenied, AccessDescriptor, SettingsStore, SyncDirection, SyncHistory, SyncOutcome};
use std::path::Path;
use std::sync::Arc;

const ACCESS: &str = "10.0.0.2,NAS,WORKGROUP,user,secret,pins,/sync";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn nas() -> DeviceRef {
    DeviceRef {
        name: "NAS".to_string(),
        host: "10.0.0.2".to_string(),
        group: "WORKGROUP".to_string(),
    }
}

struct Device {
    local: LocalStore,
    sync: PinSync,
}

/// Configure a device the way an app would: settings file first, then the
/// coordinator built from it.
fn device(root: &Path, mount: &Path, name: &str, uuid: &str) -> Device {
    let settings = SettingsStore::open(root.join(name).join("settings.json")).unwrap();
    let mut values = settings.get();
    values.device_name = name.to_string();
    values.device_uuid = uuid.to_string();
    values.local_data_dir = root.join(name).join("data");
    values.keep_alive = false;
    values.discovery_window_ms = 100;
    settings.update(values).unwrap();
    settings
        .save_access(AccessDescriptor::from_delimited(ACCESS).unwrap())
        .unwrap();

    let values = settings.get();
    let config = CentralConfig::from_settings(&values);
    let transport = Arc::new(FolderTransport::single(nas(), mount));
    let central = Arc::new(Central::spawn(config, transport));
    let history = Arc::new(SyncHistory::open(root.join(name).join("history.json")).unwrap());

    Device {
        local: LocalStore::new(&values.local_data_dir),
        sync: PinSync::new(central, history, values.identity()),
    }
}

async fn edit(device: &Device, name: &str, contents: &str) {
    device.local.write(DATABASE, contents.as_bytes()).await.unwrap();
    device.local.write(DATABASE_SHM, b"shm").await.unwrap();
    device.local.write(DATABASE_WAL, b"wal").await.unwrap();
    device.local.stamp_last_updated(name).await.unwrap();
}

fn assert_completed(report: &SyncReport, direction: SyncDirection) {
    assert_eq!(report.outcome, SyncOutcome::Completed, "{:?}", report.detail);
    assert_eq!(report.direction, direction);
}

#[tokio::test]
async fn test_edit_travels_between_devices() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mount = dir.path().join("mount");
    std::fs::create_dir_all(mount.join("pins")).unwrap();

    let alice = device(dir.path(), &mount, "Alice", "UUID-A");
    let bob = device(dir.path(), &mount, "Bob", "UUID-B");

    edit(&alice, "Alice", "alice-v1").await;
    alice.local.write_image("harbor.jpg", b"jpeg").await.unwrap();

    let report = alice.sync.synchronize().await;
    assert_completed(&report, SyncDirection::DeviceToRemote);
    assert!(!mount.join("pins/sync/lockFile").exists());
    assert!(mount.join("pins/sync/images/harbor.jpg").exists());

    // Bob has never synced, so the remote copy wins
    let report = bob.sync.synchronize().await;
    assert_completed(&report, SyncDirection::RemoteToDevice);
    assert_eq!(bob.local.read(DATABASE).await.unwrap(), b"alice-v1");
    assert_eq!(bob.local.read_image("harbor.jpg").await.unwrap(), b"jpeg");

    // Nothing changed since
    let report = alice.sync.synchronize().await;
    assert_eq!(report.outcome, SyncOutcome::AlreadyInSync);
    assert_eq!(alice.sync.history().count(), 2);
}

#[tokio::test]
async fn test_held_lock_keeps_other_device_out() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mount = dir.path().join("mount");
    std::fs::create_dir_all(mount.join("pins")).unwrap();

    let alice = device(dir.path(), &mount, "Alice", "UUID-A");
    let bob = device(dir.path(), &mount, "Bob", "UUID-B");

    edit(&alice, "Alice", "alice-v1").await;
    alice.sync.synchronize().await;

    // Alice holds the lock while her app is in the foreground
    let access = alice.sync.enter_foreground().await.unwrap();
    assert!(access.by_me());

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    edit(&bob, "Bob", "bob-v2").await;
    let report = bob.sync.synchronize().await;
    assert_eq!(report.outcome, SyncOutcome::Denied);
    assert_eq!(
        std::fs::read(mount.join("pins/sync/Pins.sqlite")).unwrap(),
        b"alice-v1"
    );
    assert_eq!(
        std::fs::read(mount.join("pins/sync/lockFile")).unwrap(),
        b"Alice,UUID-A"
    );

    let err = bob.sync.upload_image("x.jpg", b"x".to_vec()).await;
    assert!(err.is_err());
    assert_eq!(
        bob.sync.central().check_can_update(),
        Err(AccessDenied::LockedBy {
            owner: "Alice".to_string()
        })
    );

    // Once Alice leaves, Bob's newer data goes up
    alice.sync.enter_background().await.unwrap();
    let report = bob.sync.synchronize().await;
    assert_completed(&report, SyncDirection::DeviceToRemote);
    assert_eq!(
        std::fs::read(mount.join("pins/sync/Pins.sqlite")).unwrap(),
        b"bob-v2"
    );
}

#[tokio::test]
async fn test_discovery_lists_mounted_device() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mount = dir.path().join("mount");
    std::fs::create_dir_all(mount.join("pins")).unwrap();
    let bob = device(dir.path(), &mount, "Bob", "UUID-B");

    let central = bob.sync.central();
    assert_eq!(central.discover_devices().wait().await.unwrap(), vec![nas()]);

    central.connect(nas(), "user", "secret").wait().await.unwrap();
    let shares = central.list_shares().wait().await.unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].name, "pins");
    central.disconnect().wait().await.unwrap();
}
