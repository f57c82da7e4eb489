// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Mounted folder transport
//
// Drives a share that the operating system already mounted (SMB via the
// desktop, or a folder kept in sync by a cloud client). Each configured mount
// point is one device, and its sub-directories are the shares.

use crate::transport::{DeviceRef, FileRef, RemoteFileTransport, ShareRef, TransportError};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

/// A device reachable through a local mount point
#[derive(Debug, Clone)]
pub struct FolderMount {
    pub device: DeviceRef,
    pub root: PathBuf,
}

impl FolderMount {
    pub fn new(device: DeviceRef, root: impl Into<PathBuf>) -> Self {
        Self {
            device,
            root: root.into(),
        }
    }
}

#[derive(Debug, Default)]
struct FolderState {
    mount: Option<PathBuf>,
    share: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FolderTransport {
    mounts: Vec<FolderMount>,
    state: Mutex<FolderState>,
}

impl FolderTransport {
    pub fn new(mounts: Vec<FolderMount>) -> Self {
        Self {
            mounts,
            state: Mutex::new(FolderState::default()),
        }
    }

    /// Single mount point, share names are its sub-directories
    pub fn single(device: DeviceRef, root: impl Into<PathBuf>) -> Self {
        Self::new(vec![FolderMount::new(device, root)])
    }

    fn mount_root(&self) -> Result<PathBuf, TransportError> {
        self.state
            .lock()
            .unwrap()
            .mount
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    fn share_root(&self) -> Result<PathBuf, TransportError> {
        let state = self.state.lock().unwrap();
        if state.mount.is_none() {
            return Err(TransportError::NotConnected);
        }
        state
            .share
            .clone()
            .ok_or_else(|| TransportError::Other("No share open".to_string()))
    }

    /// Map a share-relative path onto the mount. Paths may not leave the share.
    fn resolve(&self, path: &str) -> Result<PathBuf, TransportError> {
        let share = self.share_root()?;
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(TransportError::Other(format!("Path escapes share: {}", path)));
        }
        Ok(share.join(relative))
    }
}

fn map_io(err: io::Error, path: &str) -> TransportError {
    match err.kind() {
        io::ErrorKind::NotFound => TransportError::NotFound(path.to_string()),
        io::ErrorKind::TimedOut => TransportError::Timeout,
        _ => TransportError::Io(format!("{}: {}", path, err)),
    }
}

#[async_trait]
impl RemoteFileTransport for FolderTransport {
    async fn discover(&self, found: async_channel::Sender<DeviceRef>) -> Result<(), TransportError> {
        for mount in &self.mounts {
            if fs::metadata(&mount.root).await.is_ok() {
                if found.send(mount.device.clone()).await.is_err() {
                    tracing::debug!("Discovery results no longer wanted, stopping");
                    break;
                }
            } else {
                tracing::debug!("Mount point {:?} not present", mount.root);
            }
        }
        Ok(())
    }

    async fn connect(&self, device: &DeviceRef, _user: &str, _password: &str) -> Result<(), TransportError> {
        let mount = self
            .mounts
            .iter()
            .find(|m| m.device.host == device.host || m.device.name == device.name)
            .ok_or_else(|| TransportError::Other(format!("Unknown device {}", device.host)))?;

        let metadata = fs::metadata(&mount.root)
            .await
            .map_err(|e| map_io(e, &mount.root.to_string_lossy()))?;
        if !metadata.is_dir() {
            return Err(TransportError::Other(format!(
                "Mount point is not a directory: {:?}",
                mount.root
            )));
        }

        let mut state = self.state.lock().unwrap();
        state.mount = Some(mount.root.clone());
        state.share = None;
        tracing::debug!("Connected to {:?}", mount.root);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.mount = None;
        state.share = None;
        Ok(())
    }

    async fn list_shares(&self) -> Result<Vec<ShareRef>, TransportError> {
        let root = self.mount_root()?;
        let mut entries = fs::read_dir(&root)
            .await
            .map_err(|e| map_io(e, &root.to_string_lossy()))?;

        let mut shares = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_io(e, &root.to_string_lossy()))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_dir && !name.starts_with('.') {
                shares.push(ShareRef::new(name));
            }
        }
        shares.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shares)
    }

    async fn open_share(&self, share: &ShareRef) -> Result<(), TransportError> {
        let path = self.mount_root()?.join(&share.name);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {
                self.state.lock().unwrap().share = Some(path);
                Ok(())
            }
            Ok(_) => Err(TransportError::Other(format!("Not a share: {}", share.name))),
            Err(e) => Err(map_io(e, &share.name)),
        }
    }

    async fn close_share(&self, _share: &ShareRef) -> Result<(), TransportError> {
        self.state.lock().unwrap().share = None;
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<FileRef>, TransportError> {
        let dir = self.resolve(path)?;
        let mut entries = fs::read_dir(&dir).await.map_err(|e| map_io(e, path))?;
        let prefix = path.trim_matches('/');

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(e, path))? {
            let metadata = entry.metadata().await.map_err(|e| map_io(e, path))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let entry_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            listing.push(FileRef {
                name,
                path: entry_path,
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let file = self.resolve(path)?;
        fs::read(&file).await.map_err(|e| map_io(e, path))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await.map_err(|e| map_io(e, path))?;
        }
        fs::write(&file, bytes).await.map_err(|e| map_io(e, path))
    }

    async fn delete_file(&self, path: &str) -> Result<(), TransportError> {
        let file = self.resolve(path)?;
        fs::remove_file(&file).await.map_err(|e| map_io(e, path))
    }

    async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir).await.map_err(|e| map_io(e, path))
    }
}
