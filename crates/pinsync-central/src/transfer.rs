// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Bulk transfer engine
//
// Copies a manifest between the device and the remote store, one file at a
// time. The destination is cleared first. Database manifests abort on the
// first failure; picture manifests skip the failed file and carry on.

use crate::local_store::LocalStore;
use crate::transport::{RemoteFileTransport, TransportError};
use crate::types::{CentralError, TransferReport};
use pinsync_core::manifest::{is_image_candidate, remote_path, IMAGES_DIR};
use pinsync_core::TransferManifest;

pub struct BulkTransferEngine<'a, T: ?Sized> {
    transport: &'a T,
    local: &'a LocalStore,
    root: &'a str,
}

impl<'a, T> BulkTransferEngine<'a, T>
where
    T: RemoteFileTransport + ?Sized,
{
    pub fn new(transport: &'a T, local: &'a LocalStore, root: &'a str) -> Self {
        Self {
            transport,
            local,
            root,
        }
    }

    fn images_root(&self) -> String {
        remote_path(self.root, IMAGES_DIR)
    }

    /// Device to remote, database files. lastUpdated is written last.
    pub async fn database_to_remote(&self) -> Result<TransferReport, CentralError> {
        let mut manifest = TransferManifest::database();
        let mut report = TransferReport::new(manifest.kind());

        while let Some(name) = manifest.peek_delete() {
            let path = remote_path(self.root, name);
            match self.transport.delete_file(&path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Remote {} already absent", path);
                }
                Err(e) => {
                    tracing::error!("Failed to delete remote {}: {}", path, e);
                    return Err(e.into());
                }
            }
            if let Some(name) = manifest.mark_deleted() {
                report.deleted.push(name);
            }
        }

        for name in manifest.write_order() {
            let bytes = self
                .local
                .read(&name)
                .await
                .map_err(|e| CentralError::LocalIo(format!("{}: {}", name, e)))?;

            let path = remote_path(self.root, &name);
            if let Err(e) = self.transport.write_file(&path, &bytes).await {
                tracing::error!("Failed to write remote {}, aborting: {}", path, e);
                return Err(e.into());
            }
            report.transferred.push(name);
        }

        tracing::info!("Copied {} database files to remote", report.transferred.len());
        Ok(report)
    }

    /// Remote to device, database files. Local copies are removed first;
    /// lastUpdated is pulled last so a failed pull leaves no fresh marker.
    pub async fn database_from_remote(&self) -> Result<TransferReport, CentralError> {
        let mut manifest = TransferManifest::database();
        let mut report = TransferReport::new(manifest.kind());

        while let Some(name) = manifest.peek_delete() {
            self.local
                .delete(name)
                .await
                .map_err(|e| CentralError::LocalIo(format!("{}: {}", name, e)))?;
            if let Some(name) = manifest.mark_deleted() {
                report.deleted.push(name);
            }
        }

        for name in manifest.write_order() {
            let path = remote_path(self.root, &name);
            let bytes = match self.transport.read_file(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("Failed to read remote {}, aborting: {}", path, e);
                    return Err(e.into());
                }
            };
            self.local
                .write(&name, &bytes)
                .await
                .map_err(|e| CentralError::LocalIo(format!("{}: {}", name, e)))?;
            report.transferred.push(name);
        }

        tracing::info!("Copied {} database files from remote", report.transferred.len());
        Ok(report)
    }

    /// Picture names on the remote store. A missing directory has none.
    pub async fn remote_image_names(&self) -> Result<Vec<String>, TransportError> {
        let listing = match self.transport.list_directory(&self.images_root()).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = listing
            .into_iter()
            .filter(|entry| !entry.is_dir && is_image_candidate(&entry.name))
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Device to remote, pictures
    pub async fn images_to_remote(&self) -> Result<TransferReport, CentralError> {
        let images_root = self.images_root();
        match self.transport.create_directory(&images_root).await {
            Ok(()) => {}
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => tracing::debug!("create_directory {}: {}", images_root, e),
        }

        let mut stale = TransferManifest::images(self.remote_image_names().await?);
        let mut report = TransferReport::new(stale.kind());

        while let Some(name) = stale.peek_delete() {
            let path = remote_path(&images_root, name);
            match self.transport.delete_file(&path).await {
                Ok(()) => {
                    report.deleted.push(name.to_string());
                }
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => tracing::warn!("Failed to delete remote image {}: {}", path, e),
            }
            stale.mark_deleted();
        }

        let manifest = TransferManifest::images(self.local.image_names().await?);
        for name in manifest.write_order() {
            let bytes = match self.local.read_image(&name).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping unreadable local image {}: {}", name, e);
                    report.failed.push(name);
                    continue;
                }
            };

            match self.transport.write_file(&remote_path(&images_root, &name), &bytes).await {
                Ok(()) => report.transferred.push(name),
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Skipping image {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        tracing::info!(
            "Copied {} images to remote, {} failed",
            report.transferred.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Remote to device, pictures. The remote listing is consumed from the
    /// back one file at a time.
    pub async fn images_from_remote(&self) -> Result<TransferReport, CentralError> {
        let images_root = self.images_root();
        let mut remaining = self.remote_image_names().await?;
        let mut report = TransferReport::new(pinsync_core::ManifestKind::Images);

        for name in self.local.image_names().await? {
            match self.local.delete_image(&name).await {
                Ok(()) => report.deleted.push(name),
                Err(e) => tracing::warn!("Failed to delete local image {}: {}", name, e),
            }
        }

        while let Some(name) = remaining.pop() {
            let path = remote_path(&images_root, &name);
            let bytes = match self.transport.read_file(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Skipping remote image {}: {}", name, e);
                    report.failed.push(name);
                    continue;
                }
            };

            match self.local.write_image(&name, &bytes).await {
                Ok(()) => report.transferred.push(name),
                Err(e) => {
                    tracing::warn!("Failed to store image {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        tracing::info!(
            "Copied {} images from remote, {} failed",
            report.transferred.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, Op};
    use pinsync_core::manifest::{DATABASE, DATABASE_SHM, DATABASE_WAL, LAST_UPDATED};

    async fn seeded_local(dir: &std::path::Path) -> LocalStore {
        let local = LocalStore::new(dir);
        local.write(LAST_UPDATED, b"2024-01-02 00:00:00,Bob").await.unwrap();
        local.write(DATABASE, b"db").await.unwrap();
        local.write(DATABASE_SHM, b"shm").await.unwrap();
        local.write(DATABASE_WAL, b"wal").await.unwrap();
        local
    }

    fn seed_remote(transport: &MockTransport) {
        transport.put("sync/lastUpdated", b"2024-01-03 00:00:00,Alice");
        transport.put("sync/Pins.sqlite", b"remote-db");
        transport.put("sync/Pins.sqlite-shm", b"remote-shm");
        transport.put("sync/Pins.sqlite-wal", b"remote-wal");
    }

    #[tokio::test]
    async fn test_database_push_writes_marker_last() {
        let dir = tempfile::tempdir().unwrap();
        let local = seeded_local(dir.path()).await;
        let transport = MockTransport::new();
        seed_remote(&transport);

        let report = BulkTransferEngine::new(&transport, &local, "sync")
            .database_to_remote()
            .await
            .unwrap();

        assert_eq!(transport.deletes().first().map(String::as_str), Some("sync/lastUpdated"));
        assert_eq!(
            transport.writes(),
            vec![
                "sync/Pins.sqlite",
                "sync/Pins.sqlite-shm",
                "sync/Pins.sqlite-wal",
                "sync/lastUpdated",
            ]
        );
        assert_eq!(report.transferred.last().map(String::as_str), Some(LAST_UPDATED));
        assert_eq!(transport.file("sync/Pins.sqlite").unwrap(), b"db");
    }

    #[tokio::test]
    async fn test_database_push_aborts_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let local = seeded_local(dir.path()).await;
        let transport = MockTransport::new();
        transport.fail_writes_to("sync/Pins.sqlite-shm");

        let err = BulkTransferEngine::new(&transport, &local, "sync")
            .database_to_remote()
            .await
            .unwrap_err();

        assert!(matches!(err, CentralError::Transport(TransportError::Io(_))));
        // Earlier file stays, nothing after the failure is written
        assert_eq!(transport.writes(), vec!["sync/Pins.sqlite", "sync/Pins.sqlite-shm"]);
        assert!(transport.file("sync/Pins.sqlite").is_some());
        assert!(transport.file("sync/lastUpdated").is_none());
    }

    #[tokio::test]
    async fn test_database_pull_replaces_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let local = seeded_local(dir.path()).await;
        let transport = MockTransport::new();
        seed_remote(&transport);

        let report = BulkTransferEngine::new(&transport, &local, "sync")
            .database_from_remote()
            .await
            .unwrap();

        assert_eq!(report.transferred.len(), 4);
        assert_eq!(local.read(DATABASE).await.unwrap(), b"remote-db");
        assert_eq!(
            local.read_marker().await.unwrap(),
            b"2024-01-03 00:00:00,Alice"
        );
    }

    #[tokio::test]
    async fn test_database_pull_aborts_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let local = seeded_local(dir.path()).await;
        let transport = MockTransport::new();
        seed_remote(&transport);
        transport.fail_reads_from("sync/Pins.sqlite-wal");

        assert!(BulkTransferEngine::new(&transport, &local, "sync")
            .database_from_remote()
            .await
            .is_err());
        assert!(local.read_marker().await.is_none());
    }

    #[tokio::test]
    async fn test_image_push_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            local.write_image(name, name.as_bytes()).await.unwrap();
        }
        let transport = MockTransport::new();
        transport.put("sync/images/old.jpg", b"old");
        transport.fail_writes_to("sync/images/b.jpg");

        let report = BulkTransferEngine::new(&transport, &local, "sync")
            .images_to_remote()
            .await
            .unwrap();

        assert_eq!(report.transferred, vec!["a.jpg", "c.jpg"]);
        assert_eq!(report.failed, vec!["b.jpg"]);
        assert_eq!(report.deleted, vec!["old.jpg"]);
        assert!(transport.file("sync/images/old.jpg").is_none());
        assert_eq!(transport.file("sync/images/c.jpg").unwrap(), b"c.jpg");
    }

    #[tokio::test]
    async fn test_image_pull_replaces_local_images() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        local.write_image("stale.jpg", b"stale").await.unwrap();
        let transport = MockTransport::new();
        transport.put("sync/images/x.jpg", b"x");
        transport.put("sync/images/y.jpg", b"y");
        transport.put("sync/images/.DS_Store", b"junk");
        transport.fail_reads_from("sync/images/x.jpg");

        let report = BulkTransferEngine::new(&transport, &local, "sync")
            .images_from_remote()
            .await
            .unwrap();

        assert_eq!(report.transferred, vec!["y.jpg"]);
        assert_eq!(report.failed, vec!["x.jpg"]);
        assert_eq!(local.image_names().await.unwrap(), vec!["y.jpg"]);
    }

    #[tokio::test]
    async fn test_dropped_session_aborts_image_push() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            local.write_image(name, name.as_bytes()).await.unwrap();
        }
        let transport = MockTransport::new();
        // create_directory, list, write a.jpg, then the session drops
        transport.drop_session_after(3);

        let result = BulkTransferEngine::new(&transport, &local, "sync")
            .images_to_remote()
            .await;

        assert!(matches!(
            result,
            Err(CentralError::Transport(TransportError::NotConnected))
        ));
        assert_eq!(transport.file("sync/images/a.jpg").unwrap(), b"a.jpg");
        assert!(transport.file("sync/images/c.jpg").is_none());
        assert_eq!(transport.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_session_aborts_image_pull() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        let transport = MockTransport::new();
        transport.put("sync/images/x.jpg", b"x");
        transport.put("sync/images/y.jpg", b"y");
        // The listing succeeds, the first read does not
        transport.drop_session_after(1);

        let result = BulkTransferEngine::new(&transport, &local, "sync")
            .images_from_remote()
            .await;

        assert!(matches!(
            result,
            Err(CentralError::Transport(TransportError::NotConnected))
        ));
        assert!(local.image_names().await.unwrap().is_empty());
        assert_eq!(transport.count(|op| matches!(op, Op::Read(_))), 1);
    }

    #[tokio::test]
    async fn test_missing_remote_images_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        let transport = MockTransport::new();

        let names = BulkTransferEngine::new(&transport, &local, "sync")
            .remote_image_names()
            .await
            .unwrap();
        assert!(names.is_empty());
    }
}
