// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - Sync history persistence
//
// Stores one record per sync pass in a local JSON file.

use crate::types::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// Maximum number of history entries to keep
const MAX_HISTORY_ENTRIES: usize = 100;

/// Which way data moved during a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncDirection {
    DeviceToRemote,
    RemoteToDevice,
    None,
}

/// How a sync pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Completed,
    AlreadyInSync,
    Denied,
    Failed,
}

/// One finished sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub id: String,
    pub at: DateTime<Utc>,
    pub direction: SyncDirection,
    pub outcome: SyncOutcome,
    /// Free-form detail shown next to the record
    #[serde(default)]
    pub detail: Option<String>,
}

impl SyncRecord {
    pub fn new(direction: SyncDirection, outcome: SyncOutcome, detail: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            direction,
            outcome,
            detail,
        }
    }
}

/// File-based sync history storage
pub struct SyncHistory {
    records: RwLock<Vec<SyncRecord>>,
    file_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    records: Vec<SyncRecord>,
}

impl SyncHistory {
    /// Create a new history store in the platform config directory
    pub fn new() -> Result<Self, AppError> {
        let file_path = crate::settings::config_dir()?.join("history.json");
        Self::open(file_path)
    }

    /// Open a history store at an explicit path, loading it if present
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();

        let records = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read history: {}", e)))?;

            let file: HistoryFile = serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse history, starting fresh: {}", e);
                HistoryFile {
                    records: Vec::new(),
                }
            });

            file.records
        } else {
            Vec::new()
        };

        Ok(Self {
            records: RwLock::new(records),
            file_path,
        })
    }

    /// Persist history to disk
    fn persist(&self) -> Result<(), AppError> {
        let records = self.records.read().unwrap();
        let file = HistoryFile {
            records: records.clone(),
        };

        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize history: {}", e)))?;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::FileIo(format!("Failed to create history dir: {}", e)))?;
        }

        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write history: {}", e)))?;

        Ok(())
    }

    /// Get all sync records, newest first
    pub fn list(&self) -> Vec<SyncRecord> {
        self.records.read().unwrap().clone()
    }

    /// Most recent record, if any
    pub fn latest(&self) -> Option<SyncRecord> {
        self.records.read().unwrap().first().cloned()
    }

    /// Add a new sync record
    pub fn add(&self, record: SyncRecord) -> Result<(), AppError> {
        {
            let mut records = self.records.write().unwrap();
            records.insert(0, record);

            if records.len() > MAX_HISTORY_ENTRIES {
                records.truncate(MAX_HISTORY_ENTRIES);
            }
        }

        self.persist()
    }

    /// Clear all history
    pub fn clear(&self) -> Result<(), AppError> {
        {
            let mut records = self.records.write().unwrap();
            records.clear();
        }

        self.persist()
    }

    /// Get the count of history entries
    pub fn count(&self) -> usize {
        self.records.read().unwrap().len()
    }
}
