// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - Settings persistence
//
// Settings are stored in a local JSON file. The NAS access descriptor is
// kept inside it as a single delimited string.

use crate::types::{AccessDescriptor, AppError, SyncSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// In-memory cache of settings, persisted to disk on changes
pub struct SettingsStore {
    settings: RwLock<SyncSettings>,
    file_path: PathBuf,
}

impl SettingsStore {
    /// Create a new settings store in the platform config directory
    pub fn new() -> Result<Self, AppError> {
        let file_path = config_dir()?.join("settings.json");
        Self::open(file_path)
    }

    /// Open a settings store at an explicit path, loading it if present
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();
        tracing::info!("Settings file path: {:?}", file_path);

        let settings = if file_path.exists() {
            tracing::info!("Loading settings from disk");
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read settings: {}", e)))?;

            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings, using defaults: {}", e);
                SyncSettings::default()
            })
        } else {
            tracing::info!("No settings file found, using defaults");
            SyncSettings::default()
        };

        let store = Self {
            settings: RwLock::new(settings),
            file_path,
        };

        // Persist defaults so the generated device UUID stays stable
        if !store.file_path.exists() {
            tracing::info!("Creating initial settings file");
            store.persist()?;
        }

        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Persist settings to disk
    fn persist(&self) -> Result<(), AppError> {
        let settings = self.settings.read().unwrap();

        let content = serde_json::to_string_pretty(&*settings)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;
        }

        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> SyncSettings {
        self.settings.read().unwrap().clone()
    }

    /// Update settings and persist to disk
    pub fn update(&self, new_settings: SyncSettings) -> Result<(), AppError> {
        tracing::info!("Updating settings for device {}", new_settings.device_name);
        {
            let mut settings = self.settings.write().unwrap();
            *settings = new_settings;
        }

        let result = self.persist();
        if result.is_ok() {
            tracing::info!("Settings persisted successfully");
        } else {
            tracing::error!("Failed to persist settings: {:?}", result);
        }
        result
    }

    /// Replace the stored NAS access descriptor as a whole
    pub fn save_access(&self, access: AccessDescriptor) -> Result<(), AppError> {
        tracing::info!("Saving NAS access for {}/{}", access.host, access.share);
        {
            let mut settings = self.settings.write().unwrap();
            settings.nas_access = Some(access);
        }
        self.persist()
    }

    /// Forget the stored NAS access descriptor
    pub fn clear_access(&self) -> Result<(), AppError> {
        {
            let mut settings = self.settings.write().unwrap();
            settings.nas_access = None;
        }
        self.persist()
    }
}

/// Platform config directory, created on demand
pub(crate) fn config_dir() -> Result<PathBuf, AppError> {
    let config_dir = directories::ProjectDirs::from("com", "pinsync", "pins")
        .ok_or_else(|| AppError::FileIo("Could not determine config directory".to_string()))?
        .config_dir()
        .to_path_buf();

    fs::create_dir_all(&config_dir)
        .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;

    Ok(config_dir)
}
