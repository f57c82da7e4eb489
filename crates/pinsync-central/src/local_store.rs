// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Local side of a transfer
//
// The device keeps its database files and the lastUpdated marker in one
// data directory, with pictures in an `images` subdirectory.

use pinsync_core::manifest::{is_image_candidate, IMAGES_DIR, LAST_UPDATED};
use pinsync_core::LastUpdatedMarker;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_DIR)
    }

    pub async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.data_dir.join(name)).await
    }

    pub async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir).await?;
        fs::write(self.data_dir.join(name), bytes).await
    }

    /// Delete a data file. A file that is already gone counts as deleted.
    pub async fn delete(&self, name: &str) -> io::Result<()> {
        remove_if_present(&self.data_dir.join(name)).await
    }

    /// Raw local marker, if there is one
    pub async fn read_marker(&self) -> Option<Vec<u8>> {
        self.read(LAST_UPDATED).await.ok()
    }

    /// Record that the local data changed now
    pub async fn stamp_last_updated(&self, device_name: &str) -> io::Result<LastUpdatedMarker> {
        let marker = LastUpdatedMarker::now(device_name);
        self.write(LAST_UPDATED, marker.render().as_bytes()).await?;
        tracing::debug!("Stamped local lastUpdated: {}", marker.render());
        Ok(marker)
    }

    /// Picture files on the device, sorted by name
    pub async fn image_names(&self) -> io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(self.images_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_image_candidate(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read_image(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.images_dir().join(name)).await
    }

    pub async fn write_image(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let dir = self.images_dir();
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(name), bytes).await
    }

    pub async fn delete_image(&self, name: &str) -> io::Result<()> {
        remove_if_present(&self.images_dir().join(name)).await
    }
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
