// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - File names and transfer manifests
//
// A manifest is the ordered set of files moved by one bulk transfer.
// Deletions are consumed from the back of a pending list so a failed
// deletion can be retried by peeking again.

/// Sentinel naming the device allowed to write the shared store
pub const LOCK_FILE: &str = "lockFile";
/// Marker holding the time of the last complete write
pub const LAST_UPDATED: &str = "lastUpdated";
pub const DATABASE: &str = "Pins.sqlite";
pub const DATABASE_SHM: &str = "Pins.sqlite-shm";
pub const DATABASE_WAL: &str = "Pins.sqlite-wal";
/// Directory holding pin photos, locally and on the remote store
pub const IMAGES_DIR: &str = "images";

/// Directory entries that never hold pin data
const EXCLUDED_ENTRIES: [&str; 3] = ["Inbox", "tmp", ".Trash"];

/// Database files in manifest order. `lastUpdated` comes first.
pub fn database_files() -> Vec<String> {
    [LAST_UPDATED, DATABASE, DATABASE_SHM, DATABASE_WAL]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Whether a directory entry is a picture file worth transferring
pub fn is_image_candidate(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !EXCLUDED_ENTRIES.contains(&name)
}

/// Join a remote directory and a file name with `/`
pub fn remote_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Database files: any failure aborts the whole transfer
    Database,
    /// Pictures: failures are skipped
    Images,
}

impl ManifestKind {
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Database)
    }
}

#[derive(Debug, Clone)]
pub struct TransferManifest {
    kind: ManifestKind,
    files: Vec<String>,
    pending_deletes: Vec<String>,
    deleted: Vec<String>,
}

impl TransferManifest {
    /// The fixed database manifest
    pub fn database() -> Self {
        Self::new(ManifestKind::Database, database_files())
    }

    /// A picture manifest built from a directory listing
    pub fn images<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| is_image_candidate(name))
            .collect();
        Self::new(ManifestKind::Images, files)
    }

    fn new(kind: ManifestKind, files: Vec<String>) -> Self {
        // Reversed so popping from the back yields manifest order
        let pending_deletes = files.iter().rev().cloned().collect();
        Self {
            kind,
            files,
            pending_deletes,
            deleted: Vec::new(),
        }
    }

    pub fn kind(&self) -> ManifestKind {
        self.kind
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Next file to delete on the destination, without consuming it
    pub fn peek_delete(&self) -> Option<&str> {
        self.pending_deletes.last().map(String::as_str)
    }

    /// Consume the file returned by `peek_delete`
    pub fn mark_deleted(&mut self) -> Option<String> {
        let name = self.pending_deletes.pop()?;
        self.deleted.push(name.clone());
        Some(name)
    }

    /// Files already removed from the destination
    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    /// Order in which files are written. `lastUpdated` always goes last so
    /// the destination never claims freshness for a partial copy.
    pub fn write_order(&self) -> Vec<String> {
        let mut order: Vec<String> = self
            .files
            .iter()
            .filter(|name| name.as_str() != LAST_UPDATED)
            .cloned()
            .collect();
        if self.files.iter().any(|name| name == LAST_UPDATED) {
            order.push(LAST_UPDATED.to_string());
        }
        order
    }
}
