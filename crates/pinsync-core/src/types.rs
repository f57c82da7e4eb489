// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - Type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of comma-joined fields in a persisted access descriptor
const ACCESS_FIELD_COUNT: usize = 7;

/// Where the shared store lives and how to reach it.
///
/// Persisted as a single comma-joined string
/// (`host,netbiosName,group,userName,password,share,path`) and replaced
/// only as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessDescriptor {
    pub host: String,
    pub netbios_name: String,
    pub group: String,
    pub user_name: String,
    pub password: String,
    pub share: String,
    pub path: String,
}

impl AccessDescriptor {
    /// Render the descriptor into its persisted form
    pub fn to_delimited(&self) -> String {
        [
            self.host.as_str(),
            self.netbios_name.as_str(),
            self.group.as_str(),
            self.user_name.as_str(),
            self.password.as_str(),
            self.share.as_str(),
            self.path.as_str(),
        ]
        .join(",")
    }

    /// Parse the persisted form. Exactly seven fields are required.
    pub fn from_delimited(value: &str) -> Result<Self, AppError> {
        let fields: Vec<&str> = value.split(',').collect();
        if fields.len() != ACCESS_FIELD_COUNT {
            return Err(AppError::InvalidAccessDescriptor(format!(
                "expected {} fields, found {}",
                ACCESS_FIELD_COUNT,
                fields.len()
            )));
        }

        Ok(Self {
            host: fields[0].to_string(),
            netbios_name: fields[1].to_string(),
            group: fields[2].to_string(),
            user_name: fields[3].to_string(),
            password: fields[4].to_string(),
            share: fields[5].to_string(),
            path: fields[6].to_string(),
        })
    }

    /// Root of the shared store inside the share, without surrounding slashes
    pub fn root_path(&self) -> &str {
        self.path.trim_matches('/')
    }
}

impl TryFrom<String> for AccessDescriptor {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_delimited(&value)
    }
}

impl From<AccessDescriptor> for String {
    fn from(value: AccessDescriptor) -> Self {
        value.to_delimited()
    }
}

/// Name and UUID this device writes into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub name: String,
    pub uuid: String,
}

impl DeviceIdentity {
    /// Commas and surrounding whitespace are dropped from both fields so the
    /// identity survives the comma-separated lock file.
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: lock_field(&name.into()),
            uuid: lock_field(&uuid.into()),
        }
    }
}

/// Normalize a value written as one field of the lock file
pub(crate) fn lock_field(value: &str) -> String {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Application settings (UI-agnostic)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Device name written into lock and marker files
    pub device_name: String,
    /// Stable device UUID written into the lock file
    pub device_uuid: String,
    /// Directory holding the local database files and images
    pub local_data_dir: PathBuf,
    /// NAS access descriptor, absent until the user saves one
    #[serde(default)]
    pub nas_access: Option<AccessDescriptor>,
    /// How long device discovery runs before reporting what it found
    #[serde(default = "default_discovery_window_ms")]
    pub discovery_window_ms: u64,
    /// Restart the session after it ends unless the app is resigning
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

fn default_discovery_window_ms() -> u64 {
    3000
}

fn default_keep_alive() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        let local_data_dir = directories::ProjectDirs::from("com", "pinsync", "pins")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            device_name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "Pin Device".to_string()),
            device_uuid: uuid::Uuid::new_v4().to_string(),
            local_data_dir,
            nas_access: None,
            discovery_window_ms: default_discovery_window_ms(),
            keep_alive: default_keep_alive(),
        }
    }
}

impl SyncSettings {
    /// Identity used for lock ownership
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.device_name, &self.device_uuid)
    }
}

/// Why a remote-mutating operation was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("Shared store is locked by {owner}")]
    LockedBy { owner: String },

    #[error("Shared store is currently syncing")]
    Updating,

    #[error("This device does not hold the lock")]
    NotLockOwner,
}

/// Error types for the core crate
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid access descriptor: {0}")]
    InvalidAccessDescriptor(String),

    #[error("Access denied: {0}")]
    AccessDenied(#[from] AccessDenied),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}
