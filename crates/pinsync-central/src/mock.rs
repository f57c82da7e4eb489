// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Recording in-memory transport for tests

use crate::transport::{DeviceRef, FileRef, RemoteFileTransport, ShareRef, TransportError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Discover,
    Connect(String),
    Disconnect,
    ListShares,
    OpenShare(String),
    CloseShare(String),
    List(String),
    Read(String),
    Write(String),
    Delete(String),
    CreateDir(String),
}

#[derive(Default)]
pub struct MockTransport {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    ops: Mutex<Vec<Op>>,
    devices: Mutex<Vec<DeviceRef>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_connects: AtomicUsize,
    /// Operations left until one reports a dropped session; 0 disables
    drop_countdown: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct FlightGuard<'a>(&'a AtomicUsize);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(path.to_string(), bytes.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn writes(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Delete(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: fn(&Op) -> bool) -> usize {
        self.ops().iter().filter(|op| wanted(op)).count()
    }

    pub fn add_device(&self, device: DeviceRef) {
        self.devices.lock().unwrap().push(device);
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_reads_from(&self, path: &str) {
        self.failing_reads.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// The next operation reports a dropped session
    pub fn drop_session(&self) {
        self.drop_session_after(0);
    }

    /// Let `count` operations through, then report a dropped session
    pub fn drop_session_after(&self, count: usize) {
        self.drop_countdown.store(count + 1, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: Op) -> Result<FlightGuard<'_>, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = FlightGuard(&self.in_flight);

        let dropped = !matches!(op, Op::Connect(_))
            && self
                .drop_countdown
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map(|previous| previous == 1)
                .unwrap_or(false);
        self.ops.lock().unwrap().push(op);
        tokio::task::yield_now().await;

        if dropped {
            Err(TransportError::NotConnected)
        } else {
            Ok(guard)
        }
    }
}

#[async_trait]
impl RemoteFileTransport for MockTransport {
    async fn discover(&self, found: async_channel::Sender<DeviceRef>) -> Result<(), TransportError> {
        let _guard = self.enter(Op::Discover).await?;
        let devices = self.devices.lock().unwrap().clone();
        for device in devices {
            let _ = found.send(device).await;
        }
        // Real discovery never finishes on its own
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn connect(&self, device: &DeviceRef, _user: &str, _password: &str) -> Result<(), TransportError> {
        let _guard = self.enter(Op::Connect(device.host.clone())).await?;
        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Other("connection refused".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let _guard = self.enter(Op::Disconnect).await?;
        Ok(())
    }

    async fn list_shares(&self) -> Result<Vec<ShareRef>, TransportError> {
        let _guard = self.enter(Op::ListShares).await?;
        Ok(vec![ShareRef::new("pins")])
    }

    async fn open_share(&self, share: &ShareRef) -> Result<(), TransportError> {
        let _guard = self.enter(Op::OpenShare(share.name.clone())).await?;
        Ok(())
    }

    async fn close_share(&self, share: &ShareRef) -> Result<(), TransportError> {
        let _guard = self.enter(Op::CloseShare(share.name.clone())).await?;
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<FileRef>, TransportError> {
        let _guard = self.enter(Op::List(path.to_string())).await?;
        let prefix = format!("{}/", path.trim_end_matches('/'));

        let mut entries: BTreeMap<String, FileRef> = BTreeMap::new();
        for (key, bytes) in self.files.lock().unwrap().iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let (name, is_dir) = match rest.split_once('/') {
                Some((dir, _)) => (dir.to_string(), true),
                None => (rest.to_string(), false),
            };
            entries.entry(name.clone()).or_insert(FileRef {
                path: format!("{}{}", prefix, name),
                name,
                is_dir,
                size: if is_dir { 0 } else { bytes.len() as u64 },
            });
        }

        if entries.is_empty() && !self.dirs.lock().unwrap().contains(path) {
            return Err(TransportError::NotFound(path.to_string()));
        }
        Ok(entries.into_values().collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let _guard = self.enter(Op::Read(path.to_string())).await?;
        if self.failing_reads.lock().unwrap().contains(path) {
            return Err(TransportError::Io(format!("read failed: {}", path)));
        }
        self.file(path)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let _guard = self.enter(Op::Write(path.to_string())).await?;
        if self.failing_writes.lock().unwrap().contains(path) {
            return Err(TransportError::Io(format!("write failed: {}", path)));
        }
        self.put(path, bytes);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), TransportError> {
        let _guard = self.enter(Op::Delete(path.to_string())).await?;
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }

    async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        let _guard = self.enter(Op::CreateDir(path.to_string())).await?;
        self.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }
}
